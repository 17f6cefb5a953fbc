//! Template interpolation of string nodes.
//!
//! A string whose whole text is one `{expr}` region evaluates to the raw
//! value of the expression, which need not be a string. Any other string has
//! each balanced `{expr}` region replaced by the stringified value. `{{` and
//! `}}` outside a region are literal braces, and a `{` with no matching `}`
//! is left as it is.

use serde_json::Value;

use crate::error::ScriptError;
use crate::expr::{self, EvalContext};
use crate::node::ScriptNode;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Expr(String),
}

/// Evaluates string nodes against a run context.
pub struct Interpolator<'a> {
    ctx: &'a dyn EvalContext,
}

impl<'a> Interpolator<'a> {
    pub fn new(ctx: &'a dyn EvalContext) -> Self {
        Self { ctx }
    }

    /// Interpolate a string node. Other node kinds are rejected.
    pub fn interpolate(&self, node: &ScriptNode) -> Result<Value, ScriptError> {
        let Some(text) = node.as_str() else {
            return Err(ScriptError::new(
                format!("Cannot interpolate a node of type '{}'", node.kind()),
                node,
            ));
        };
        self.render(text).map_err(|e| ScriptError::new(e, node))
    }

    /// Interpolate a string node that must produce a scalar, rendered as text.
    pub fn interpolate_string(&self, node: &ScriptNode) -> Result<String, ScriptError> {
        match self.interpolate(node)? {
            Value::String(s) => Ok(s),
            v @ (Value::Number(_) | Value::Bool(_)) => Ok(expr::to_display_string(&v)),
            other => Err(ScriptError::new(
                format!("Expected a string but expression produced '{}'", other),
                node,
            )),
        }
    }

    /// Evaluate a `when` guard: booleans are taken as is, strings are
    /// interpolated and tested for truthiness.
    pub fn guard(&self, node: &ScriptNode) -> Result<bool, ScriptError> {
        match node.as_bool() {
            Some(b) => Ok(b),
            None => Ok(expr::truthy(&self.interpolate(node)?)),
        }
    }

    /// Apply the template rule to raw text.
    pub fn render(&self, text: &str) -> Result<Value, String> {
        let pieces = split(text);

        if let [Piece::Expr(source)] = pieces.as_slice() {
            return self.evaluate(source);
        }

        let mut out = String::with_capacity(text.len());
        for piece in &pieces {
            match piece {
                Piece::Text(t) => out.push_str(t),
                Piece::Expr(source) => out.push_str(&expr::to_display_string(&self.evaluate(source)?)),
            }
        }
        Ok(Value::String(out))
    }

    fn evaluate(&self, source: &str) -> Result<Value, String> {
        expr::evaluate(source, self.ctx)
            .map_err(|e| format!("Unable to evaluate '{}': {}", source.trim(), e))
    }
}

/// Break `text` into literal text and expression regions.
fn split(text: &str) -> Vec<Piece> {
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '{' => match region_end(&chars, i) {
                Some(end) => {
                    let inner: String = chars[i + 1..end].iter().collect();
                    if inner.trim().is_empty() {
                        literal.extend(&chars[i..=end]);
                    } else {
                        if !literal.is_empty() {
                            pieces.push(Piece::Text(std::mem::take(&mut literal)));
                        }
                        pieces.push(Piece::Expr(inner));
                    }
                    i = end + 1;
                }
                None => {
                    literal.push('{');
                    i += 1;
                }
            },
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if !literal.is_empty() || pieces.is_empty() {
        pieces.push(Piece::Text(literal));
    }
    pieces
}

/// Index of the `}` closing the region opened at `start`, skipping braces
/// inside quoted strings.
fn region_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = start;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                if c == '\\' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Location, NodeValue};
    use serde_json::json;

    struct Vars(Value);

    impl EvalContext for Vars {
        fn lookup(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }

        fn is_function_namespace(&self, _name: &str) -> bool {
            false
        }

        fn call_function(&self, ns: &str, f: &str, _args: Vec<Value>) -> Result<Value, String> {
            Err(format!("{}.{} is not a function", ns, f))
        }
    }

    fn vars() -> Vars {
        Vars(json!({ "name": "web1", "x": 1, "on": false }))
    }

    fn node(text: &str) -> ScriptNode {
        ScriptNode::string(text, Location::new(4, 9))
    }

    #[test]
    fn test_whole_region_returns_raw_value() {
        let ctx = vars();
        let interp = Interpolator::new(&ctx);
        assert_eq!(interp.interpolate(&node("{x}")).expect("eval"), json!(1));
        assert_eq!(interp.interpolate(&node("{ on }")).expect("eval"), json!(false));
    }

    #[test]
    fn test_embedded_regions_are_stringified() {
        let ctx = vars();
        let interp = Interpolator::new(&ctx);
        assert_eq!(
            interp.interpolate(&node("{name}.example.com")).expect("eval"),
            json!("web1.example.com")
        );
        assert_eq!(
            interp.interpolate(&node("{name}-{x}")).expect("eval"),
            json!("web1-1")
        );
    }

    #[test]
    fn test_plain_and_escaped_text() {
        let ctx = vars();
        let interp = Interpolator::new(&ctx);
        assert_eq!(interp.interpolate(&node("plain")).expect("eval"), json!("plain"));
        assert_eq!(interp.interpolate(&node("")).expect("eval"), json!(""));
        assert_eq!(interp.interpolate(&node("{{x}}")).expect("eval"), json!("{x}"));
        assert_eq!(interp.interpolate(&node("a { b")).expect("eval"), json!("a { b"));
        assert_eq!(interp.interpolate(&node("{}")).expect("eval"), json!("{}"));
    }

    #[test]
    fn test_braces_inside_string_literals() {
        let ctx = vars();
        let interp = Interpolator::new(&ctx);
        assert_eq!(
            interp.interpolate(&node("{'}' + name}")).expect("eval"),
            json!("}web1")
        );
    }

    #[test]
    fn test_errors_point_at_node() {
        let ctx = vars();
        let interp = Interpolator::new(&ctx);
        let err = interp.interpolate(&node("{missing}")).unwrap_err();
        assert!(err.message.contains("missing is not defined"));
        assert_eq!((err.line, err.column), (4, 9));

        let number = ScriptNode::new(NodeValue::Boolean(true), Location::new(1, 1));
        assert!(interp.interpolate(&number).is_err());
    }

    #[test]
    fn test_guard() {
        let ctx = vars();
        let interp = Interpolator::new(&ctx);
        let b = ScriptNode::new(NodeValue::Boolean(false), Location::new(1, 1));
        assert!(!interp.guard(&b).expect("guard"));
        assert!(!interp.guard(&node("{on}")).expect("guard"));
        assert!(interp.guard(&node("{name === 'web1'}")).expect("guard"));
    }

    #[test]
    fn test_interpolate_string_rejects_containers() {
        let ctx = Vars(json!({ "list": [1], "n": 3 }));
        let interp = Interpolator::new(&ctx);
        assert_eq!(interp.interpolate_string(&node("{n}")).expect("eval"), "3");
        assert!(interp.interpolate_string(&node("{list}")).is_err());
    }
}
