//! Maps targets to live elements
//!
//! Ids and XPath expressions are handed to the page as they are. HTML snippets go through
//! progressive disambiguation: tag and text first, then the snippet's attributes one at a time,
//! identifying attributes leading. When candidates remain after every attribute has been
//! consulted, a single-element lookup takes the first one in document order. That tie-break is a
//! heuristic; nothing guarantees it is the element the snippet was captured from.

use crate::browser::page::Page;
use crate::dom::html::parse_first_element;
use crate::dom::target::{Target, TargetKind};
use crate::dom::xpath::tag_with_text;
use crate::error::Result;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Attributes consulted first when disambiguating a snippet, in this order. If one of these
    /// rules out every candidate, the lookup fails instead of moving on.
    pub identifying_attributes: Vec<String>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self { identifying_attributes: vec!["id".into(), "aria-label".into(), "class".into()] }
    }
}

impl ResolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identifying_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifying_attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_identifying(&self, attribute: &str) -> bool {
        self.identifying_attributes.iter().any(|a| a.eq_ignore_ascii_case(attribute))
    }
}

/// The parts of a snippet used for matching
#[derive(Debug, Clone, PartialEq)]
pub struct SnippetElement {
    pub tag_name: String,
    /// All descendant text, concatenated and trimmed
    pub text: String,
    /// Attributes in source order
    pub attributes: IndexMap<String, String>,
}

impl SnippetElement {
    /// `None` when the snippet holds no element at all
    pub fn parse(snippet: &str) -> Result<Option<Self>> {
        Ok(parse_first_element(snippet)?.map(|element| Self {
            text: element.text().trim().to_string(),
            tag_name: element.tag_name,
            attributes: element.attributes,
        }))
    }

    /// Attributes with the identifying ones first (in configured order), then the rest in source order
    pub fn ordered_attributes(&self, options: &ResolverOptions) -> Vec<(&str, &str)> {
        let mut ordered: Vec<(&str, &str)> = options
            .identifying_attributes
            .iter()
            .filter_map(|name| self.attributes.get_key_value(&name.to_ascii_lowercase()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        for (key, value) in &self.attributes {
            if !options.is_identifying(key) {
                ordered.push((key.as_str(), value.as_str()));
            }
        }
        ordered
    }
}

/// Resolve a classified target. With `single`, at most one element is returned.
pub fn resolve_target<P: Page>(
    page: &P,
    target: &Target,
    options: &ResolverOptions,
    single: bool,
) -> Result<Vec<P::Element>> {
    let mut elements = match target.kind {
        TargetKind::Id => page.find_by_id(&target.value)?,
        TargetKind::XPath => page.find_by_xpath(&target.value)?,
        TargetKind::Html => resolve_snippet(page, &target.value, options, single)?,
    };
    if single {
        elements.truncate(1);
    }
    debug!("Resolved {} to {} element(s)", target, elements.len());
    Ok(elements)
}

/// Find the live element(s) a captured HTML snippet refers to
pub fn resolve_snippet<P: Page>(
    page: &P,
    snippet: &str,
    options: &ResolverOptions,
    force_single: bool,
) -> Result<Vec<P::Element>> {
    let Some(snippet) = SnippetElement::parse(snippet)? else {
        return Ok(Vec::new());
    };

    let mut candidates = page.find_by_xpath(&tag_with_text(&snippet.tag_name, Some(&snippet.text)))?;
    if candidates.len() == 1 {
        return Ok(candidates);
    }
    if candidates.is_empty() {
        if snippet.text.is_empty() {
            return Ok(Vec::new());
        }
        // Text may have changed since the snippet was captured; fall back to the tag alone
        candidates = page.find_by_xpath(&tag_with_text(&snippet.tag_name, None))?;
        if candidates.len() <= 1 {
            return Ok(candidates);
        }
    }

    for (attribute, value) in snippet.ordered_attributes(options) {
        let identifying = options.is_identifying(attribute);
        let tokens: Vec<&str> = value.split_whitespace().collect();

        let mut holders = Vec::new();
        for candidate in &candidates {
            if let Some(values) = page.attribute(candidate, attribute)? {
                let values: Vec<String> = values.split_whitespace().map(str::to_string).collect();
                holders.push((candidate.clone(), values));
            }
        }

        // A lone holder wins even when its value has drifted from the snippet's
        if holders.len() == 1 {
            return Ok(holders.into_iter().map(|(element, _)| element).collect());
        }

        for token in &tokens {
            if holders.is_empty() {
                break;
            }
            holders.retain(|(_, values)| values.iter().any(|v| v == token));
            if holders.len() == 1 {
                return Ok(holders.into_iter().map(|(element, _)| element).collect());
            }
        }

        if holders.is_empty() {
            if identifying {
                debug!("Identifying attribute '{}' ruled out every candidate", attribute);
                return Ok(Vec::new());
            }
            continue;
        }

        candidates = holders.into_iter().map(|(element, _)| element).collect();
    }

    if force_single {
        candidates.truncate(1);
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::tree::DomTree;

    fn ids(page: &DomTree, elements: &[<DomTree as Page>::Element]) -> Vec<String> {
        elements
            .iter()
            .map(|e| page.attribute(e, "id").unwrap().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_snippet_element_parse() {
        let snippet = SnippetElement::parse("<div class=\"example\" id=\"test\"><p>Hello</p><p>World</p></div>")
            .unwrap()
            .unwrap();
        assert_eq!(snippet.tag_name, "div");
        assert_eq!(snippet.text, "HelloWorld");
        assert_eq!(snippet.attributes.get("class"), Some(&"example".to_string()));

        let snippet = SnippetElement::parse("<a href='#'>  Tom &amp; Jerry \n</a>").unwrap().unwrap();
        assert_eq!(snippet.text, "Tom & Jerry");

        assert!(SnippetElement::parse("just text").unwrap().is_none());
    }

    #[test]
    fn test_ordered_attributes() {
        let snippet =
            SnippetElement::parse("<a href=\"/x\" class=\"c\" data-k=\"v\" id=\"i\">x</a>").unwrap().unwrap();
        let ordered: Vec<&str> = snippet.ordered_attributes(&ResolverOptions::default()).into_iter().map(|(k, _)| k).collect();
        assert_eq!(ordered, vec!["id", "class", "href", "data-k"]);
    }

    #[test]
    fn test_unique_tag_and_text() {
        let page = DomTree::parse("<button id='a'>Cancel</button><button id='b'>Submit order</button>").unwrap();
        let found = resolve_snippet(&page, "<button>Submit</button>", &ResolverOptions::default(), false).unwrap();
        assert_eq!(ids(&page, &found), vec!["b"]);
    }

    #[test]
    fn test_falls_back_to_tag_when_text_changed() {
        let page = DomTree::parse("<p>intro</p><button id='only'>Buy now</button>").unwrap();
        let found = resolve_snippet(&page, "<button>Add to cart</button>", &ResolverOptions::default(), false).unwrap();
        assert_eq!(ids(&page, &found), vec!["only"]);

        let page = DomTree::parse("<p>intro</p>").unwrap();
        let found = resolve_snippet(&page, "<button>Add to cart</button>", &ResolverOptions::default(), false).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_identifying_attribute_picks_match() {
        let page = DomTree::parse("<button id='first'>Save</button><button id='second'>Save</button>").unwrap();
        let found =
            resolve_snippet(&page, "<button id=\"second\">Save</button>", &ResolverOptions::default(), false).unwrap();
        assert_eq!(ids(&page, &found), vec!["second"]);
    }

    #[test]
    fn test_identifying_attribute_mismatch_fails() {
        let page = DomTree::parse(
            "<button id='first' name='a'>Save</button><button id='second' name='b'>Save</button>",
        )
        .unwrap();
        // `name` would disambiguate, but `id` rules everything out first
        let found = resolve_snippet(
            &page,
            "<button id=\"third\" name=\"b\">Save</button>",
            &ResolverOptions::default(),
            false,
        )
        .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_class_tokens_intersect() {
        let page = DomTree::parse(
            "<a id='1' class='tab'>Go</a><a id='2' class='tab active'>Go</a><a id='3' class='tab active big'>Go</a>",
        )
        .unwrap();
        let found = resolve_snippet(&page, "<a class=\"big tab\">Go</a>", &ResolverOptions::default(), false).unwrap();
        assert_eq!(ids(&page, &found), vec!["3"]);

        let found = resolve_snippet(&page, "<a class=\"active\">Go</a>", &ResolverOptions::default(), false).unwrap();
        assert_eq!(ids(&page, &found), vec!["2", "3"]);
    }

    #[test]
    fn test_unique_after_first_token_ignores_drifted_tokens() {
        let page = DomTree::parse("<a id='1' class='tab'>Go</a><a id='2' class='x'>Go</a>").unwrap();
        // `active` was a state class at capture time and is gone now
        let found = resolve_snippet(&page, "<a class=\"tab active\">Go</a>", &ResolverOptions::default(), false).unwrap();
        assert_eq!(ids(&page, &found), vec!["1"]);
    }

    #[test]
    fn test_lone_attribute_holder_is_returned() {
        let page = DomTree::parse("<button id='a' aria-label='Delete'>Save</button><button>Save</button>").unwrap();
        let found =
            resolve_snippet(&page, "<button aria-label=\"Save\">Save</button>", &ResolverOptions::default(), false)
                .unwrap();
        assert_eq!(ids(&page, &found), vec!["a"]);
    }

    #[test]
    fn test_non_identifying_mismatch_is_skipped() {
        let page = DomTree::parse(
            "<input id='1' type='text' name='q'><input id='2' type='text' name='other'>",
        )
        .unwrap();
        // `placeholder` matches nothing and is ignored; `name` then decides
        let found = resolve_snippet(
            &page,
            "<input placeholder=\"Search\" name=\"q\">",
            &ResolverOptions::new().identifying_attributes(["aria-label"]),
            false,
        )
        .unwrap();
        assert_eq!(ids(&page, &found), vec!["1"]);

        let found = resolve_snippet(
            &page,
            "<input type=\"text\" data-role=\"x\">",
            &ResolverOptions::new().identifying_attributes(["aria-label"]),
            false,
        )
        .unwrap();
        assert_eq!(ids(&page, &found), vec!["1", "2"]);
    }

    #[test]
    fn test_force_single_takes_document_order() {
        let page = DomTree::parse("<li id='x'>Row</li><li id='y'>Row</li>").unwrap();
        let all = resolve_snippet(&page, "<li>Row</li>", &ResolverOptions::default(), false).unwrap();
        assert_eq!(all.len(), 2);

        let single = resolve_snippet(&page, "<li>Row</li>", &ResolverOptions::default(), true).unwrap();
        assert_eq!(ids(&page, &single), vec!["x"]);
    }

    #[test]
    fn test_resolve_target_dispatch() {
        let page = DomTree::parse("<div id='box'><input name='q'></div>").unwrap();
        let options = ResolverOptions::default();

        assert_eq!(resolve_target(&page, &Target::parse("box"), &options, false).unwrap().len(), 1);
        assert_eq!(resolve_target(&page, &Target::parse("//input[@name='q']"), &options, false).unwrap().len(), 1);
        assert_eq!(resolve_target(&page, &Target::parse("//*"), &options, true).unwrap().len(), 1);
        assert!(resolve_target(&page, &Target::parse("id:nothing"), &options, false).unwrap().is_empty());
    }
}
