//! `{{key}}` placeholder rendering against a [`DataBag`].
//!
//! Strings are inserted verbatim; any other JSON value is inserted as its JSON
//! text. Whitespace inside the braces is ignored (`{{ topic }}` works).
//! Placeholders whose key is absent from the bag are left untouched and
//! reported back so callers can log them.

use pipeline::DataBag;
use serde_json::Value;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Result of rendering a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    /// The rendered text.
    pub text: String,
    /// Keys referenced by the template but absent from the bag, in order of appearance.
    pub unresolved: Vec<String>,
}

/// Substitutes every `{{key}}` in `template` with the matching value from `bag`.
pub fn render(template: &str, bag: &DataBag) -> Rendered {
    let mut text = String::with_capacity(template.len());
    let mut unresolved = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        text.push_str(&rest[..start]);
        let raw = &after_open[..end];
        let key = raw.trim();

        match bag.get(key) {
            Some(Value::String(s)) if !key.is_empty() => text.push_str(s),
            Some(other) if !key.is_empty() => text.push_str(&other.to_string()),
            _ => {
                text.push_str(OPEN);
                text.push_str(raw);
                text.push_str(CLOSE);
                if !key.is_empty() && !unresolved.iter().any(|k| k == key) {
                    unresolved.push(key.to_string());
                }
            }
        }

        rest = &after_open[end + CLOSE.len()..];
    }

    text.push_str(rest);
    Rendered { text, unresolved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag() -> DataBag {
        DataBag::new()
            .with("topic", "discipline")
            .with("count", 3)
            .with("tags", json!(["a", "b"]))
    }

    #[test]
    fn test_substitutes_string_values_verbatim() {
        let out = render("Write about {{topic}}.", &bag());
        assert_eq!(out.text, "Write about discipline.");
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn test_non_string_values_use_json_text() {
        let out = render("{{count}} items: {{tags}}", &bag());
        assert_eq!(out.text, r#"3 items: ["a","b"]"#);
    }

    #[test]
    fn test_whitespace_inside_braces_is_tolerated() {
        let out = render("About {{ topic }}!", &bag());
        assert_eq!(out.text, "About discipline!");
    }

    #[test]
    fn test_unresolved_placeholders_are_kept_and_reported() {
        let out = render("{{missing}} and {{ missing }} and {{topic}}", &bag());
        assert_eq!(out.text, "{{missing}} and {{ missing }} and discipline");
        assert_eq!(out.unresolved, vec!["missing".to_string()]);
    }

    #[test]
    fn test_unterminated_and_empty_placeholders() {
        let out = render("Hello {{}} {{topic", &bag());
        assert_eq!(out.text, "Hello {{}} {{topic");
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn test_template_without_placeholders_is_unchanged() {
        let out = render("Give me a motivational quote.", &DataBag::new());
        assert_eq!(out.text, "Give me a motivational quote.");
    }
}
