//! Helper functions exposed to expressions under the `fs`, `path`,
//! `dateTime` and `util` namespaces.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde_json::Value;

use crate::expr::{self, EvalContext};
use crate::paths;

pub const NAMESPACES: [&str; 4] = ["fs", "path", "dateTime", "util"];

pub fn is_namespace(name: &str) -> bool {
    NAMESPACES.contains(&name)
}

/// Dispatch `namespace.function(args)`.
pub fn call(
    ctx: &dyn EvalContext,
    namespace: &str,
    function: &str,
    args: &[Value],
) -> Result<Value, String> {
    match (namespace, function) {
        ("fs", "readFile") => {
            let file = string_arg(args, 0, "fs.readFile")?;
            std::fs::read_to_string(&file)
                .map(Value::String)
                .map_err(|e| format!("Unable to read '{}': {}", file, e))
        }
        ("path", "join") => Ok(path_value(&join_segments(args))),
        ("path", "dirname") => {
            let p = string_arg(args, 0, "path.dirname")?;
            let dir = Path::new(&p).parent().unwrap_or(Path::new(""));
            if dir.as_os_str().is_empty() {
                Ok(Value::String(if p.starts_with('/') { "/" } else { "." }.to_string()))
            } else {
                Ok(path_value(dir))
            }
        }
        ("path", "basename") => {
            let p = string_arg(args, 0, "path.basename")?;
            let mut base = Path::new(&p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if let Some(Value::String(ext)) = args.get(1) {
                if base.len() > ext.len() && base.ends_with(ext.as_str()) {
                    base.truncate(base.len() - ext.len());
                }
            }
            Ok(Value::String(base))
        }
        ("path", "extname") => {
            let p = string_arg(args, 0, "path.extname")?;
            let ext = Path::new(&p)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            Ok(Value::String(ext))
        }
        ("dateTime", "asLocal") => {
            let when = date_arg(args)?;
            Ok(Value::String(
                when.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %:z").to_string(),
            ))
        }
        ("dateTime", "asISO") => {
            let when = date_arg(args)?;
            Ok(Value::String(
                when.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            ))
        }
        ("util", "template") => {
            let text = string_arg(args, 0, "util.template")?;
            let open = optional_string(args, 1).unwrap_or_else(|| "{{".to_string());
            let close = optional_string(args, 2).unwrap_or_else(|| "}}".to_string());
            template(ctx, &text, &open, &close).map(Value::String)
        }
        _ => Err(format!("{}.{} is not a function", namespace, function)),
    }
}

/// Replace every `open ... close` region of `text` with its evaluated value.
pub fn template(ctx: &dyn EvalContext, text: &str, open: &str, close: &str) -> Result<String, String> {
    if open.is_empty() || close.is_empty() {
        return Err("Template delimiters must not be empty".to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        let after_open = &rest[start + open.len()..];
        let Some(end) = after_open.find(close) else {
            break;
        };
        out.push_str(&rest[..start]);
        let value = expr::evaluate(after_open[..end].trim(), ctx)?;
        out.push_str(&expr::to_display_string(&value));
        rest = &after_open[end + close.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Join every argument with `/` and normalize. A later segment starting with
/// `/` stays under the earlier ones and an empty result is `.`.
fn join_segments(args: &[Value]) -> PathBuf {
    let joined = args
        .iter()
        .map(expr::to_display_string)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    let normalized = paths::normalize(Path::new(&joined));
    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}

fn path_value(p: &Path) -> Value {
    Value::String(p.to_string_lossy().into_owned())
}

fn string_arg(args: &[Value], index: usize, function: &str) -> Result<String, String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(format!(
            "{} expects a string argument, got '{}'",
            function, other
        )),
        None => Err(format!("{} expects at least {} argument(s)", function, index + 1)),
    }
}

fn optional_string(args: &[Value], index: usize) -> Option<String> {
    match args.get(index) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// The instant named by the first argument (RFC 3339 text or epoch
/// milliseconds), or now.
fn date_arg(args: &[Value]) -> Result<DateTime<Utc>, String> {
    match args.first() {
        None | Some(Value::Null) => Ok(Utc::now()),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| format!("Invalid date '{}': {}", s, e)),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| format!("Invalid timestamp '{}'", n)),
        Some(other) => Err(format!("Invalid date '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Ctx;

    impl EvalContext for Ctx {
        fn lookup(&self, name: &str) -> Option<Value> {
            (name == "host").then(|| json!("db1"))
        }

        fn is_function_namespace(&self, name: &str) -> bool {
            is_namespace(name)
        }

        fn call_function(&self, ns: &str, f: &str, args: Vec<Value>) -> Result<Value, String> {
            call(self, ns, f, &args)
        }
    }

    fn run(ns: &str, f: &str, args: Value) -> Result<Value, String> {
        let Value::Array(args) = args else {
            panic!("args must be an array")
        };
        call(&Ctx, ns, f, &args)
    }

    #[test]
    fn test_path_functions() {
        assert_eq!(run("path", "join", json!(["/etc", "nginx", "../ssh"])), Ok(json!("/etc/ssh")));
        assert_eq!(run("path", "dirname", json!(["/etc/hosts"])), Ok(json!("/etc")));
        assert_eq!(run("path", "dirname", json!(["hosts"])), Ok(json!(".")));
        assert_eq!(run("path", "basename", json!(["/a/b.conf"])), Ok(json!("b.conf")));
        assert_eq!(run("path", "basename", json!(["/a/b.conf", ".conf"])), Ok(json!("b")));
        assert_eq!(run("path", "extname", json!(["/a/b.tar.gz"])), Ok(json!(".gz")));
        assert_eq!(run("path", "extname", json!(["/a/b"])), Ok(json!("")));
    }

    #[test]
    fn test_path_join_keeps_leading_segments() {
        assert_eq!(
            run("path", "join", json!(["/home/ops", "/.ssh", "id_ed25519"])),
            Ok(json!("/home/ops/.ssh/id_ed25519"))
        );
        assert_eq!(run("path", "join", json!(["etc/", "/nginx/"])), Ok(json!("etc/nginx")));
        assert_eq!(run("path", "join", json!(["", ""])), Ok(json!(".")));
        assert_eq!(run("path", "join", json!([])), Ok(json!(".")));
        assert_eq!(run("path", "join", json!(["a", ".."])), Ok(json!(".")));
    }

    #[test]
    fn test_read_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("motd");
        std::fs::write(&file, "hello").expect("write");
        let path = file.to_string_lossy().into_owned();
        assert_eq!(run("fs", "readFile", json!([path])), Ok(json!("hello")));
        assert!(run("fs", "readFile", json!(["/nonexistent/file"])).is_err());
    }

    #[test]
    fn test_date_time() {
        assert_eq!(
            run("dateTime", "asISO", json!(["2024-01-02T03:04:05Z"])),
            Ok(json!("2024-01-02T03:04:05.000Z"))
        );
        assert_eq!(
            run("dateTime", "asISO", json!([0])),
            Ok(json!("1970-01-01T00:00:00.000Z"))
        );
        assert!(run("dateTime", "asLocal", json!([])).is_ok());
        assert!(run("dateTime", "asISO", json!(["yesterday"])).is_err());
    }

    #[test]
    fn test_util_template() {
        assert_eq!(
            run("util", "template", json!(["server {{host}}:{{ 5432 }};"])),
            Ok(json!("server db1:5432;"))
        );
        assert_eq!(
            run("util", "template", json!(["<%host%>", "<%", "%>"])),
            Ok(json!("db1"))
        );
        assert_eq!(
            run("util", "template", json!(["open {{ only"])),
            Ok(json!("open {{ only"))
        );
    }

    #[test]
    fn test_unknown_function() {
        assert!(run("fs", "writeFile", json!([])).unwrap_err().contains("not a function"));
    }
}
