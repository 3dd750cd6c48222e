use std::collections::BTreeMap;

use crate::github::{Issue, IssueState};

/// Class every issue link carries when rendered.
pub const ISSUE_LINK_CLASS: &str = "gh-issue-link";

pub const ATTR_HREF: &str = "href";
pub const ATTR_ISSUE_NUMBER: &str = "data-issue-number";
pub const ATTR_ISSUE_STATE: &str = "data-issue-state";
pub const ATTR_ISSUE_TITLE: &str = "data-issue-title";
pub const ATTR_CLASS: &str = "class";

/// Attributes of a link mark. A link with an `issue_number` is an issue
/// annotation; any attribute not modelled here is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkAttrs {
    pub href: String,
    pub issue_number: Option<u64>,
    pub issue_state: Option<IssueState>,
    pub issue_title: Option<String>,
    /// Class tokens, deduplicated, in first-seen order
    pub class: Vec<String>,
    pub extra: BTreeMap<String, String>,
}

impl LinkAttrs {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            ..Self::default()
        }
    }

    /// Annotation for a freshly created or fetched issue.
    pub fn for_issue(issue: &Issue) -> Self {
        Self {
            href: issue.html_url.clone(),
            issue_number: Some(issue.number),
            issue_state: Some(issue.state),
            issue_title: Some(issue.title.clone()),
            class: vec![ISSUE_LINK_CLASS.to_string()],
            extra: BTreeMap::new(),
        }
    }

    pub fn is_issue(&self) -> bool {
        self.issue_number.is_some()
    }

    pub fn is_open_issue(&self) -> bool {
        self.is_issue() && self.issue_state == Some(IssueState::Open)
    }

    pub fn has_issue_class(&self) -> bool {
        self.class.iter().any(|c| c == ISSUE_LINK_CLASS)
    }

    pub fn ensure_issue_class(&mut self) {
        if !self.has_issue_class() {
            self.class.push(ISSUE_LINK_CLASS.to_string());
        }
    }

    /// Issue links need a target and the issue class.
    pub fn is_well_formed(&self) -> bool {
        !self.is_issue() || (!self.href.is_empty() && self.has_issue_class())
    }

    /// Whether the annotation already reflects `state`.
    pub fn matches_state(&self, state: IssueState) -> bool {
        self.issue_state == Some(state) && self.has_issue_class()
    }

    pub fn add_class(&mut self, raw: &str) {
        for token in raw.split_whitespace() {
            if !self.class.iter().any(|c| c == token) {
                self.class.push(token.to_string());
            }
        }
    }

    /// Build from the attributes of an `<a>` tag.
    pub fn from_html_attrs(attrs: BTreeMap<String, String>) -> Self {
        let mut link = Self::default();
        for (name, value) in attrs {
            match name.as_str() {
                ATTR_HREF => link.href = value,
                ATTR_CLASS => link.add_class(&value),
                ATTR_ISSUE_NUMBER => match value.trim().parse::<u64>() {
                    Ok(n) if n > 0 => link.issue_number = Some(n),
                    _ => {
                        link.extra.insert(name, value);
                    }
                },
                ATTR_ISSUE_STATE => match value.parse::<IssueState>() {
                    Ok(state) => link.issue_state = Some(state),
                    Err(_) => {
                        link.extra.insert(name, value);
                    }
                },
                ATTR_ISSUE_TITLE => link.issue_title = Some(value),
                _ => {
                    link.extra.insert(name, value);
                }
            }
        }
        // An issue link without a recorded state is treated as open.
        if link.is_issue() && link.issue_state.is_none() && !link.extra.contains_key(ATTR_ISSUE_STATE) {
            link.issue_state = Some(IssueState::Open);
        }
        link
    }

    /// Attributes as rendered on `<a>`, in a stable order. Issue links
    /// always render the issue class.
    pub fn to_html_attrs(&self) -> Vec<(String, String)> {
        let mut attrs = vec![(ATTR_HREF.to_string(), self.href.clone())];
        if let Some(number) = self.issue_number {
            attrs.push((ATTR_ISSUE_NUMBER.to_string(), number.to_string()));
        }
        if let Some(state) = self.issue_state {
            attrs.push((ATTR_ISSUE_STATE.to_string(), state.to_string()));
        }
        if let Some(title) = &self.issue_title {
            attrs.push((ATTR_ISSUE_TITLE.to_string(), title.clone()));
        }

        let mut class = self.class.clone();
        if self.is_issue() && !self.has_issue_class() {
            class.push(ISSUE_LINK_CLASS.to_string());
        }
        if !class.is_empty() {
            attrs.push((ATTR_CLASS.to_string(), class.join(" ")));
        }

        attrs.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_issue_link_attrs() {
        let link = LinkAttrs::from_html_attrs(attrs(&[
            ("href", "https://github.com/acme/site/issues/3"),
            ("data-issue-number", "3"),
            ("data-issue-state", "closed"),
            ("data-issue-title", "Typo"),
            ("class", "fancy gh-issue-link fancy"),
            ("target", "_blank"),
        ]));
        assert_eq!(link.issue_number, Some(3));
        assert_eq!(link.issue_state, Some(IssueState::Closed));
        assert_eq!(link.issue_title.as_deref(), Some("Typo"));
        assert_eq!(link.class, vec!["fancy", "gh-issue-link"]);
        assert_eq!(link.extra["target"], "_blank");
        assert!(link.is_well_formed());
    }

    #[test]
    fn test_missing_state_defaults_to_open() {
        let link = LinkAttrs::from_html_attrs(attrs(&[("href", "x"), ("data-issue-number", "4")]));
        assert_eq!(link.issue_state, Some(IssueState::Open));
        assert!(link.is_open_issue());
    }

    #[test]
    fn test_plain_link_is_not_an_issue() {
        let link = LinkAttrs::from_html_attrs(attrs(&[("href", "https://example.com"), ("rel", "nofollow")]));
        assert!(!link.is_issue());
        assert_eq!(link.issue_state, None);
        assert!(link.is_well_formed());
        assert_eq!(
            link.to_html_attrs(),
            vec![
                ("href".to_string(), "https://example.com".to_string()),
                ("rel".to_string(), "nofollow".to_string()),
            ]
        );
    }

    #[test]
    fn test_unparseable_issue_attrs_are_preserved() {
        let link = LinkAttrs::from_html_attrs(attrs(&[
            ("href", "x"),
            ("data-issue-number", "abc"),
            ("data-issue-state", "draft"),
        ]));
        assert!(!link.is_issue());
        assert_eq!(link.extra["data-issue-number"], "abc");
        assert_eq!(link.extra["data-issue-state"], "draft");
    }

    #[test]
    fn test_rendering_merges_issue_class() {
        let mut link = LinkAttrs::new("https://github.com/acme/site/issues/1");
        link.issue_number = Some(1);
        link.issue_state = Some(IssueState::Open);
        link.add_class("highlight");
        let rendered = link.to_html_attrs();
        let class = rendered.iter().find(|(k, _)| k == "class").unwrap();
        assert_eq!(class.1, "highlight gh-issue-link");
        assert!(!link.is_well_formed());

        link.ensure_issue_class();
        link.ensure_issue_class();
        assert_eq!(link.class, vec!["highlight", "gh-issue-link"]);
        assert!(link.is_well_formed());
    }

    #[test]
    fn test_matches_state_requires_class() {
        let mut link = LinkAttrs::new("x");
        link.issue_number = Some(1);
        link.issue_state = Some(IssueState::Open);
        assert!(!link.matches_state(IssueState::Open));
        link.ensure_issue_class();
        assert!(link.matches_state(IssueState::Open));
        assert!(!link.matches_state(IssueState::Closed));
    }
}
