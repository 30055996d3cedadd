//! Exception reports.
//!
//! A failed operation is rendered into one text block:
//!
//! ```text
//! Uncaught exception: <value>
//! at <file>:<line>:<column>:<source line>
//! Stack trace: <stack>
//! ```
//!
//! The location and stack lines are omitted when unknown. Columns are
//! 0-based here; the stack trace uses 1-based columns.

use kpio_jsvm::{Interpreter, JsError, PropertyKey, Value};

/// Render `err`, raised while running script in `realm`.
pub fn render(realm: &Interpreter, err: JsError) -> String {
    let thrown = match realm.materialize(err) {
        JsError::Thrown(thrown) => thrown,
        JsError::Terminated => return String::from("Uncaught exception: execution terminated"),
        other => return format!("Uncaught exception: {}", other),
    };

    let mut report = String::from("Uncaught exception: ");
    report.push_str(&render_value(realm, &thrown.value));

    if let Some(location) = &thrown.location {
        report.push_str(&format!(
            "\nat {}:{}:{}:{}",
            location.script.name,
            location.line(),
            location.column(),
            location.source_line()
        ));
    }

    if let Some(stack) = stack_of(realm, &thrown.value) {
        report.push_str("\nStack trace: ");
        report.push_str(&stack);
    }

    report
}

/// String coercion of the thrown value, or its JSON when the coercion says
/// nothing more than `[object Object]`.
fn render_value(realm: &Interpreter, value: &Value) -> String {
    let text = realm
        .to_string(value)
        .unwrap_or_else(|_| value.to_display_string());
    if text != "[object Object]" {
        return text;
    }
    match realm.json_stringify(value) {
        Ok(Some(json)) => json,
        _ => text,
    }
}

fn stack_of(realm: &Interpreter, value: &Value) -> Option<String> {
    if !value.is_object() {
        return None;
    }
    match realm.get_property(value, &PropertyKey::string("stack")) {
        Ok(Value::String(stack)) => Some(stack),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpio_jsvm::{Agent, Script};
    use std::rc::Rc;

    fn failure(source: &str) -> String {
        let realm = Interpreter::new(Rc::new(Agent::default()));
        let err = realm
            .eval_script(Script::new("report.js", source))
            .unwrap_err();
        render(&realm, err)
    }

    #[test]
    fn thrown_strings_have_no_stack() {
        let report = failure("throw 'badness'");
        assert_eq!(report, "Uncaught exception: badness\nat report.js:1:0:throw 'badness'");
    }

    #[test]
    fn plain_objects_render_as_json() {
        let report = failure("\nthrow {msg: \"died\", data: 3}");
        assert!(report.starts_with("Uncaught exception: {\"msg\":\"died\",\"data\":3}\nat report.js:2:0:"));
    }

    #[test]
    fn errors_carry_location_and_stack() {
        let report = failure("function f() {\n  return missing;\n}\nf();");
        assert_eq!(
            report,
            "Uncaught exception: ReferenceError: missing is not defined\n\
             at report.js:2:2:  return missing;\n\
             Stack trace: ReferenceError: missing is not defined\n    \
             at f (report.js:2:3)\n    at report.js:4:1"
        );
    }

    #[test]
    fn termination_has_a_fixed_text() {
        let realm = Interpreter::new(Rc::new(Agent::default()));
        assert_eq!(
            render(&realm, JsError::Terminated),
            "Uncaught exception: execution terminated"
        );
    }
}
