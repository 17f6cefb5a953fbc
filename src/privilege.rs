//! Effective identity switching.
//!
//! The effective uid/gid is process-wide state. All changes go through a
//! [`PrivilegeSwitcher`], and every temporary change is held by an
//! [`IdentityGuard`] that puts the previous identity back when it is dropped,
//! including when a statement fails and the error unwinds the pass.

use std::cell::RefCell;

use nix::unistd::{Gid, Uid};
use tracing::{debug, error};

use crate::error::{Result, SpadeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    pub const ROOT: Identity = Identity { uid: 0, gid: 0 };

    pub const fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

pub trait PrivilegeSwitcher {
    /// The current effective identity.
    fn effective(&self) -> Identity;

    /// The identity of the operator who launched spade. Under `sudo` this is
    /// the invoking user, not root.
    fn launch_identity(&self) -> Identity;

    fn set_effective(&self, identity: Identity) -> Result<()>;
}

/// The invoking user recorded by sudo in `SUDO_UID`/`SUDO_GID`, when both
/// are present and numeric.
pub fn sudo_identity(uid: Option<&str>, gid: Option<&str>) -> Option<Identity> {
    let uid = uid?.trim().parse().ok()?;
    let gid = gid?.trim().parse().ok()?;
    Some(Identity::new(uid, gid))
}

/// Switches the real process identity with `setegid`/`seteuid`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSwitcher;

impl PrivilegeSwitcher for NixSwitcher {
    fn effective(&self) -> Identity {
        Identity::new(
            nix::unistd::geteuid().as_raw(),
            nix::unistd::getegid().as_raw(),
        )
    }

    fn launch_identity(&self) -> Identity {
        let sudo_uid = std::env::var("SUDO_UID").ok();
        let sudo_gid = std::env::var("SUDO_GID").ok();
        sudo_identity(sudo_uid.as_deref(), sudo_gid.as_deref()).unwrap_or_else(|| {
            Identity::new(
                nix::unistd::getuid().as_raw(),
                nix::unistd::getgid().as_raw(),
            )
        })
    }

    fn set_effective(&self, identity: Identity) -> Result<()> {
        let current = self.effective();
        if current == identity {
            return Ok(());
        }
        debug!(
            "Switching effective identity {}:{} -> {}:{}",
            current.uid, current.gid, identity.uid, identity.gid
        );

        let fail = |what: &str, e: nix::Error| {
            SpadeError::privilege(format!("Unable to set effective {}: {}", what, e))
        };

        // Regain root first so the gid can be changed, then drop to the
        // target uid last.
        if !current.is_root() {
            nix::unistd::seteuid(Uid::from_raw(0)).map_err(|e| fail("uid 0", e))?;
        }
        nix::unistd::setegid(Gid::from_raw(identity.gid))
            .map_err(|e| fail(&format!("gid {}", identity.gid), e))?;
        nix::unistd::seteuid(Uid::from_raw(identity.uid))
            .map_err(|e| fail(&format!("uid {}", identity.uid), e))?;
        Ok(())
    }
}

/// Records identity changes without touching the process. Used to dry-run
/// privilege transitions and in tests.
#[derive(Debug)]
pub struct SimulatedSwitcher {
    launch: Identity,
    /// Real uid is root, so any effective identity may be assumed.
    privileged: bool,
    current: RefCell<Identity>,
    history: RefCell<Vec<Identity>>,
}

impl SimulatedSwitcher {
    /// A process started by `launch` through sudo, so currently root.
    pub fn under_sudo(launch: Identity) -> Self {
        Self {
            launch,
            privileged: true,
            current: RefCell::new(Identity::ROOT),
            history: RefCell::new(Vec::new()),
        }
    }

    /// A process running unprivileged as `identity`.
    pub fn unprivileged(identity: Identity) -> Self {
        Self {
            launch: identity,
            privileged: false,
            current: RefCell::new(identity),
            history: RefCell::new(Vec::new()),
        }
    }

    /// Every identity set so far, in order.
    pub fn history(&self) -> Vec<Identity> {
        self.history.borrow().clone()
    }
}

impl PrivilegeSwitcher for SimulatedSwitcher {
    fn effective(&self) -> Identity {
        *self.current.borrow()
    }

    fn launch_identity(&self) -> Identity {
        self.launch
    }

    fn set_effective(&self, identity: Identity) -> Result<()> {
        if !self.privileged && identity != self.launch {
            return Err(SpadeError::privilege(format!(
                "Unable to set effective uid {}: Operation not permitted",
                identity.uid
            )));
        }
        self.history.borrow_mut().push(identity);
        *self.current.borrow_mut() = identity;
        Ok(())
    }
}

/// Holds a temporary identity and restores the previous one when dropped.
#[must_use = "the identity is restored as soon as the guard is dropped"]
pub struct IdentityGuard<'a> {
    switcher: &'a dyn PrivilegeSwitcher,
    saved: Identity,
    active: bool,
}

impl<'a> IdentityGuard<'a> {
    /// Switch to `target`, remembering the current identity.
    pub fn switch_to(switcher: &'a dyn PrivilegeSwitcher, target: Identity) -> Result<Self> {
        let saved = switcher.effective();
        switcher.set_effective(target)?;
        Ok(Self {
            switcher,
            saved,
            active: true,
        })
    }

    /// Switch to the superuser.
    pub fn elevate(switcher: &'a dyn PrivilegeSwitcher) -> Result<Self> {
        Self::switch_to(switcher, Identity::ROOT)
    }

    /// Restore now, reporting any failure.
    pub fn restore(mut self) -> Result<()> {
        self.active = false;
        self.switcher.set_effective(self.saved)
    }
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.switcher.set_effective(self.saved) {
                error!("Failed to restore effective identity: {}", e);
            }
        }
    }
}
