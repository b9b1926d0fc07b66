use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// A single top-level element: opening tag, anything (including newlines), closing tag
static WRAPPED_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*<([a-zA-Z][a-zA-Z0-9-]*)(?:\s[^>]*)?>.*</([a-zA-Z][a-zA-Z0-9-]*)\s*>\s*$")
        .expect("tag pattern is valid")
});

/// How a target string locates elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Id,
    XPath,
    /// A previously captured HTML snippet of the element
    Html,
}

impl TargetKind {
    pub const ALL: [TargetKind; 3] = [TargetKind::Id, TargetKind::XPath, TargetKind::Html];

    pub fn prefix(&self) -> &'static str {
        match self {
            TargetKind::Id => "id",
            TargetKind::XPath => "xpath",
            TargetKind::Html => "html",
        }
    }
}

/// A classified target string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub kind: TargetKind,
    pub value: String,
}

impl Target {
    /// Classify a target string.
    ///
    /// An explicit `id:`, `xpath:` or `html:` prefix wins and is stripped. Otherwise a string
    /// that is one element wrapped in matching open/close tags is a snippet, a leading `/` means
    /// XPath, and anything else is an element id.
    pub fn parse(target: &str) -> Self {
        for kind in TargetKind::ALL {
            if let Some(value) = target.strip_prefix(kind.prefix()).and_then(|rest| rest.strip_prefix(':')) {
                return Self { kind, value: value.to_string() };
            }
        }

        let kind = if is_wrapped_in_tag(target) {
            TargetKind::Html
        } else if target.starts_with('/') {
            TargetKind::XPath
        } else {
            TargetKind::Id
        };
        Self { kind, value: target.to_string() }
    }

    pub fn id(value: impl Into<String>) -> Self {
        Self { kind: TargetKind::Id, value: value.into() }
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self { kind: TargetKind::XPath, value: value.into() }
    }

    pub fn html(value: impl Into<String>) -> Self {
        Self { kind: TargetKind::Html, value: value.into() }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.value)
    }
}

impl From<&str> for Target {
    fn from(target: &str) -> Self {
        Target::parse(target)
    }
}

/// Whether `s` looks like `<tag ...>...</tag>` with matching tag names
pub fn is_wrapped_in_tag(s: &str) -> bool {
    WRAPPED_TAG
        .captures(s)
        .is_some_and(|caps| caps[1].eq_ignore_ascii_case(&caps[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_prefixes() {
        assert_eq!(Target::parse("id:submit-btn"), Target::id("submit-btn"));
        assert_eq!(Target::parse("xpath://input[@name='q']"), Target::xpath("//input[@name='q']"));
        assert_eq!(Target::parse("html:<b>x</b>"), Target::html("<b>x</b>"));
        // A prefix wins over the shape of the value
        assert_eq!(Target::parse("id:/looks/like/xpath"), Target::id("/looks/like/xpath"));
    }

    #[test]
    fn test_inferred_kinds() {
        assert_eq!(Target::parse("<button class=\"go\">Go</button>").kind, TargetKind::Html);
        assert_eq!(Target::parse("//div[@id='x']").kind, TargetKind::XPath);
        assert_eq!(Target::parse("/html/body").kind, TargetKind::XPath);
        assert_eq!(Target::parse("search-box").kind, TargetKind::Id);
    }

    #[test]
    fn test_is_wrapped_in_tag() {
        assert!(is_wrapped_in_tag("<p>This is a paragraph.</p>"));
        assert!(is_wrapped_in_tag("<div><p>This is a paragraph.</p></div>"));
        assert!(is_wrapped_in_tag("<a href='example.com'>Link</a>"));
        assert!(is_wrapped_in_tag("<div>\n<p>Text on\nmultiple lines</p>\n</div>"));
        assert!(is_wrapped_in_tag("<DIV>mixed case</div>"));
        assert!(!is_wrapped_in_tag("<div>\n<p>Text on\nmultiple lines</p>\n</span>"));
        assert!(!is_wrapped_in_tag("<input type=\"text\">"));
        assert!(!is_wrapped_in_tag("plain text"));
    }

    #[test]
    fn test_display_round_trips() {
        let target = Target::parse("//li[1]");
        assert_eq!(target.to_string(), "xpath://li[1]");
        assert_eq!(Target::parse(&target.to_string()), target);
    }
}
