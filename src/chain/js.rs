//! JavaScript literal extraction for the `js_object`, `js_objects` and
//! `js_vars` steps.
//!
//! Scripts are parsed with swc; only literal expressions (objects, arrays,
//! strings, numbers, booleans, null, `JSON.parse('...')`) are converted.

use swc_common::{sync::Lrc, FileName, SourceMap};
use swc_ecma_ast::*;
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax};

use crate::value::{Map, Value};

fn parse_script(source: &str) -> Option<Script> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(FileName::Anon.into(), source.to_string());

    let lexer = Lexer::new(
        Syntax::Es(Default::default()),
        Default::default(),
        StringInput::from(&*fm),
        None,
    );

    let mut parser = Parser::new_from(lexer);
    parser.parse_script().ok()
}

/// First object or array literal in `source`, or null.
///
/// Plain JSON is accepted as is. Otherwise the script is searched statement
/// by statement: variable initializers, expression statements, assignment
/// right hand sides and call arguments.
pub fn parse_object(source: &str) -> Value {
    parse_objects(source).into_iter().next().unwrap_or_default()
}

/// Every object or array literal in `source`, in source order. Literals
/// nested inside a found literal are part of it, not separate entries.
pub fn parse_objects(source: &str) -> Vec<Value> {
    let trimmed = source.trim();
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return vec![Value::from_json(json)];
    }

    let found = script_literals(trimmed);
    if found.is_empty() {
        // a bare `{...}` statement parses as a block, retry as an expression
        return script_literals(&format!("({trimmed})"));
    }
    found
}

fn script_literals(source: &str) -> Vec<Value> {
    let mut found = Vec::new();
    if let Some(script) = parse_script(source) {
        for stmt in &script.body {
            stmt_literals(stmt, &mut found);
        }
    }
    found
}

/// Top-level `var`/`let`/`const` declarations and plain assignments with a
/// literal value. Returns `None` when the script does not parse.
pub fn parse_vars(source: &str) -> Option<Map> {
    let script = parse_script(source)?;
    let mut result = Map::new();
    for stmt in &script.body {
        collect_vars(stmt, &mut result);
    }
    Some(result)
}

fn stmt_literals(stmt: &Stmt, found: &mut Vec<Value>) {
    match stmt {
        Stmt::Decl(Decl::Var(var_decl)) => {
            for init in var_decl.decls.iter().filter_map(|decl| decl.init.as_deref()) {
                expr_literals(init, found);
            }
        }
        Stmt::Expr(expr_stmt) => expr_literals(&expr_stmt.expr, found),
        _ => {}
    }
}

fn expr_literals(expr: &Expr, found: &mut Vec<Value>) {
    match expr {
        Expr::Object(_) | Expr::Array(_) => found.extend(expr_to_value(expr)),
        Expr::Call(call) if is_json_parse_call(call) => found.extend(expr_to_value(expr)),
        Expr::Call(call) => {
            for arg in &call.args {
                expr_literals(&arg.expr, found);
            }
        }
        Expr::Assign(assign) => expr_literals(&assign.right, found),
        Expr::Paren(paren) => expr_literals(&paren.expr, found),
        Expr::Seq(seq) => {
            for e in &seq.exprs {
                expr_literals(e, found);
            }
        }
        _ => {}
    }
}

fn collect_vars(stmt: &Stmt, result: &mut Map) {
    match stmt {
        Stmt::Decl(Decl::Var(var_decl)) => {
            for decl in &var_decl.decls {
                if let (Pat::Ident(ident), Some(init)) = (&decl.name, &decl.init) {
                    if let Some(value) = expr_to_value(init) {
                        result.insert(ident.sym.as_str().to_string(), value);
                    }
                }
            }
        }
        Stmt::Expr(expr_stmt) => {
            if let Expr::Assign(assign) = &*expr_stmt.expr {
                if let AssignTarget::Simple(SimpleAssignTarget::Ident(ident)) = &assign.left {
                    if let Some(value) = expr_to_value(&assign.right) {
                        result.insert(ident.sym.as_str().to_string(), value);
                    }
                }
            }
        }
        _ => {}
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Value::Int(n as i64)
    } else {
        Value::Float(n)
    }
}

/// Literal expression to value. Non-literal members of objects and arrays
/// become null.
fn expr_to_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Lit(Lit::Str(s)) => Some(Value::from(s.value.as_str().unwrap_or(""))),
        Expr::Lit(Lit::Num(n)) => Some(number(n.value)),
        Expr::Lit(Lit::Bool(b)) => Some(Value::Bool(b.value)),
        Expr::Lit(Lit::Null(_)) => Some(Value::Null),

        Expr::Object(obj) => {
            let mut map = Map::new();
            for prop in &obj.props {
                if let PropOrSpread::Prop(prop) = prop {
                    if let Prop::KeyValue(kv) = &**prop {
                        if let Some(key) = prop_name_to_string(&kv.key) {
                            map.insert(key, expr_to_value(&kv.value).unwrap_or_default());
                        }
                    }
                }
            }
            Some(Value::Map(map))
        }

        Expr::Array(arr) => Some(Value::List(
            arr.elems
                .iter()
                .map(|elem| match elem {
                    Some(ExprOrSpread { expr, .. }) => expr_to_value(expr).unwrap_or_default(),
                    None => Value::Null,
                })
                .collect(),
        )),

        Expr::Call(call) if is_json_parse_call(call) => {
            let ExprOrSpread { expr: arg, .. } = call.args.first()?;
            match &**arg {
                Expr::Lit(Lit::Str(s)) => {
                    let json = serde_json::from_str(s.value.as_str()?).ok()?;
                    Some(Value::from_json(json))
                }
                _ => None,
            }
        }

        Expr::Unary(unary) if unary.op == UnaryOp::Minus => match &*unary.arg {
            Expr::Lit(Lit::Num(n)) => Some(number(-n.value)),
            _ => None,
        },

        Expr::Tpl(tpl) if tpl.exprs.is_empty() => tpl
            .quasis
            .first()
            .map(|quasi| Value::from(quasi.raw.as_str())),

        Expr::Paren(paren) => expr_to_value(&paren.expr),

        _ => None,
    }
}

fn is_json_parse_call(call: &CallExpr) -> bool {
    if let Callee::Expr(expr) = &call.callee {
        if let Expr::Member(member) = &**expr {
            if let (Expr::Ident(obj), MemberProp::Ident(prop)) = (&*member.obj, &member.prop) {
                return obj.sym.as_ref() == "JSON" && prop.sym.as_ref() == "parse";
            }
        }
    }
    false
}

fn prop_name_to_string(name: &PropName) -> Option<String> {
    match name {
        PropName::Ident(ident) => Some(ident.sym.as_str().to_string()),
        PropName::Str(s) => s.value.as_str().map(|v| v.to_string()),
        PropName::Num(n) => Some(n.value.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_from_assignment() {
        let script = r#"window.__DATA__ = {"id": 7, name: 'spam', tags: ["a", "b"], price: -1.5};"#;
        let value = parse_object(script);
        assert_eq!(
            value.to_json(),
            json!({"id": 7, "name": "spam", "tags": ["a", "b"], "price": -1.5})
        );
    }

    #[test]
    fn test_object_from_json_parse() {
        let script = r#"var data = JSON.parse('{"name": "Test", "price": 99}');"#;
        let value = parse_object(script);
        assert_eq!(value.to_json(), json!({"name": "Test", "price": 99}));
    }

    #[test]
    fn test_object_plain_json_and_call_args() {
        assert_eq!(parse_object(r#" [1, 2, 3] "#), Value::from(vec![1, 2, 3]));
        assert_eq!(
            parse_object("init({a: true, b: null})").to_json(),
            json!({"a": true, "b": null})
        );
        assert_eq!(parse_object("{a: 1}").to_json(), json!({"a": 1}));
        assert_eq!(parse_object("var x = 1;"), Value::Null);
    }

    #[test]
    fn test_all_objects() {
        let script = r#"
            var a = {"id": 1, "tags": [1, 2]};
            init({b: true}, [3]);
            window.c = JSON.parse('{"c": null}');
            var n = 5;
        "#;
        let found: Vec<_> = parse_objects(script).iter().map(Value::to_json).collect();
        assert_eq!(
            found,
            vec![
                json!({"id": 1, "tags": [1, 2]}),
                json!({"b": true}),
                json!([3]),
                json!({"c": null})
            ]
        );

        assert_eq!(parse_objects(r#"{"plain": 1}"#).len(), 1);
        assert!(parse_objects("var x = 1;").is_empty());
    }

    #[test]
    fn test_vars() {
        let script = r#"
            var productId = 12345;
            let productName = "Widget";
            const config = {debug: false};
            total = `plain`;
            function noop() {}
        "#;
        let vars = parse_vars(script).unwrap();
        assert_eq!(vars["productId"], Value::Int(12345));
        assert_eq!(vars["productName"], Value::from("Widget"));
        assert_eq!(vars["config"].to_json(), json!({"debug": false}));
        assert_eq!(vars["total"], Value::from("plain"));
        assert_eq!(vars.len(), 4);
    }

    #[test]
    fn test_vars_escaped_strings() {
        let script = r#"var message = "He said \"hello\"";"#;
        let vars = parse_vars(script).unwrap();
        assert_eq!(vars["message"], Value::from(r#"He said "hello""#));
    }
}
