//! Plain-text previews of stored markup, as shown in entry lists.

use std::sync::LazyLock;

use regex::Regex;

static ISSUE_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a[^>]*class="gh-issue-link"[^>]*>([\s\S]*?)</a>"#).unwrap());

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

static ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&[a-zA-Z0-9#]+;").unwrap());

static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Flatten markup to one line of text. Issue links keep their text with no
/// padding; any other tag and any entity becomes a space.
pub fn preview(markup: &str) -> String {
    let text = ISSUE_LINK_REGEX.replace_all(markup, "$1");
    let text = TAG_REGEX.replace_all(&text, " ");
    let text = ENTITY_REGEX.replace_all(&text, " ");
    WHITESPACE_REGEX.replace_all(&text, " ").trim().to_string()
}

/// Preview of a multi-valued field.
pub fn preview_all<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|v| preview(v.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_link_text_is_inlined() {
        let markup = r#"<p>Fix<a href="u" class="gh-issue-link" data-issue-number="1">this</a>now</p>"#;
        assert_eq!(preview(markup), "Fixthisnow");
    }

    #[test]
    fn test_tags_and_entities_become_spaces() {
        assert_eq!(
            preview("<h1>Title</h1><p>a&nbsp;b &amp; <em>c</em></p>"),
            "Title a b c"
        );
        assert_eq!(preview(r#"<p>x<a href="y">link</a>z</p>"#), "x link z");
    }

    #[test]
    fn test_whitespace_collapses() {
        assert_eq!(preview("  <p>\n  one\n\n two  </p>  "), "one two");
        assert_eq!(preview(""), "");
    }

    #[test]
    fn test_multiple_values_are_joined() {
        assert_eq!(preview_all(&["<p>a</p>", "<p>b</p>"]), "a, b");
    }
}
