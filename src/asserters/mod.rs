//! Built-in asserters and actions.

mod accounts;
mod command;
mod file_contains;
mod files;

pub use accounts::{AccountDatabase, GroupAbsent, GroupExists, UserExists};
pub use command::CommandRun;
pub use file_contains::{FileContains, Position, Validation};
pub use files::{DirectoryExists, FileAbsent, FileExists};

use crate::asserter::StatementRegistry;

/// Register every built-in under its statement name.
pub fn register_builtins(registry: &mut StatementRegistry) {
    registry.register_asserter("FileExists", || Box::new(FileExists::default()));
    registry.register_asserter("FileAbsent", || Box::new(FileAbsent::default()));
    registry.register_asserter("DirectoryExists", || Box::new(DirectoryExists::default()));
    registry.register_asserter("FileContains", || Box::new(FileContains::default()));
    registry.register_asserter("UserExists", || Box::new(UserExists::default()));
    registry.register_asserter("GroupExists", || Box::new(GroupExists::default()));
    registry.register_asserter("GroupAbsent", || Box::new(GroupAbsent::default()));

    registry.register_action("CommandRun", || Box::new(CommandRun::default()));
}
