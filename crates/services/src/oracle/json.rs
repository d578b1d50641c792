/// Reduce a model reply to the outermost `{...}` object.
///
/// Replies are often wrapped in Markdown fences or surrounded by prose. Returns
/// `None` when no brace pair is present.
#[must_use]
pub fn extract_json_object(reply: &str) -> Option<&str> {
    let trimmed = reply.trim();
    let body = strip_fence(trimmed).unwrap_or(trimmed);

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

fn strip_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    // optional language tag on the opening line
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let close = rest.rfind("```")?;
    Some(rest[..close].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_bare_object_through() {
        assert_eq!(extract_json_object(r#" {"a": 1} "#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn strips_fenced_block() {
        let reply = "```json\n{\"questions\": []}\n```";
        assert_eq!(extract_json_object(reply), Some("{\"questions\": []}"));
    }

    #[test]
    fn drops_surrounding_prose() {
        let reply = "Here are your questions:\n{\"questions\": [{\"x\": {}}]}\nGood luck!";
        assert_eq!(
            extract_json_object(reply),
            Some("{\"questions\": [{\"x\": {}}]}")
        );
    }

    #[test]
    fn none_without_object() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }
}
