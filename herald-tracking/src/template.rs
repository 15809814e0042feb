//! Minimal `{{field}}` template substitution.

use std::collections::HashMap;

/// Substitute `{{key}}` placeholders from a fixed map of known keys.
///
/// Unknown placeholders are left intact so a typo surfaces in preview rather
/// than silently disappearing. The queue itself receives pre-rendered content;
/// this is for the callers that prepare it.
#[must_use]
pub fn render_template(text: &str, vars: &HashMap<&str, String>) -> String {
    let mut rendered = text.to_string();
    for (key, value) in vars {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_keys() {
        let mut vars = HashMap::new();
        vars.insert("name", "Ada".to_string());
        vars.insert("company", "Example Corp".to_string());

        let out = render_template("Hi {{name}}, welcome to {{company}}!", &vars);
        assert_eq!(out, "Hi Ada, welcome to Example Corp!");
    }

    #[test]
    fn unknown_placeholders_are_preserved() {
        let vars = HashMap::new();
        let out = render_template("Hi {{name}}", &vars);
        assert_eq!(out, "Hi {{name}}");
    }

    #[test]
    fn repeated_placeholders_all_substitute() {
        let mut vars = HashMap::new();
        vars.insert("name", "Ada".to_string());

        let out = render_template("{{name}} {{name}}", &vars);
        assert_eq!(out, "Ada Ada");
    }
}
