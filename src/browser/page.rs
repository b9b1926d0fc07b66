use crate::error::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element states that conditions can test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ElementState {
    /// Rendered and visible to the user
    Displayed,
    /// Not disabled
    Enabled,
    /// Checked checkbox/radio or selected option
    Selected,
}

impl ElementState {
    pub const ALL: [ElementState; 3] = [ElementState::Displayed, ElementState::Enabled, ElementState::Selected];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementState::Displayed => "displayed",
            ElementState::Enabled => "enabled",
            ElementState::Selected => "selected",
        }
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ElementState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown element state '{}'", s))
    }
}

/// A live document that targets can be resolved against and actions executed on.
///
/// Element handles are only meaningful for the document they were obtained from. Every time the
/// document is replaced (navigation, reload) the page must report a new [`Page::generation`] so
/// that cached handles can be recognised as stale.
pub trait Page {
    /// Handle to a live element
    type Element: Clone + fmt::Debug + PartialEq;

    /// All elements whose `id` attribute equals `id`, in document order
    fn find_by_id(&self, id: &str) -> Result<Vec<Self::Element>>;

    /// All elements matched by an XPath expression, in document order
    fn find_by_xpath(&self, xpath: &str) -> Result<Vec<Self::Element>>;

    /// Lower-case tag name
    fn tag_name(&self, element: &Self::Element) -> Result<String>;

    /// Rendered text of the element and its descendants
    fn text(&self, element: &Self::Element) -> Result<String>;

    /// Serialized markup of the element itself
    fn outer_html(&self, element: &Self::Element) -> Result<String>;

    fn attribute(&self, element: &Self::Element, name: &str) -> Result<Option<String>>;

    fn state(&self, element: &Self::Element, state: ElementState) -> Result<bool>;

    /// Whether the element is still part of the current document
    fn is_attached(&self, element: &Self::Element) -> Result<bool>;

    fn click(&mut self, element: &Self::Element) -> Result<()>;

    /// Type `text` into an already focused element
    fn send_keys(&mut self, element: &Self::Element, text: &str) -> Result<()>;

    /// Load `url`. Returns [`crate::BrowserError::NavigationTimeout`] when the load does not
    /// finish in time.
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Abort an in-flight load
    fn stop_loading(&mut self) -> Result<()>;

    /// Whether `document.readyState` is `complete`
    fn is_ready(&self) -> Result<bool>;

    /// Serialized markup of the whole body
    fn body_html(&self) -> Result<String>;

    fn scroll_height(&self) -> Result<f64>;

    fn scroll_to(&mut self, y: f64) -> Result<()>;

    /// PNG screenshot of the whole document, scrolled so that `center_on` sits in the middle of the
    /// viewport
    fn screenshot(&mut self, center_on: Option<&Self::Element>) -> Result<Vec<u8>>;

    /// Counter bumped whenever the document is replaced
    fn generation(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_state_from_str() {
        assert_eq!("displayed".parse::<ElementState>(), Ok(ElementState::Displayed));
        assert_eq!("enabled".parse::<ElementState>(), Ok(ElementState::Enabled));
        assert_eq!("selected".parse::<ElementState>(), Ok(ElementState::Selected));
        assert!("clickable".parse::<ElementState>().is_err());
    }

    #[test]
    fn test_element_state_serde() {
        let state: ElementState = serde_json::from_str("\"selected\"").unwrap();
        assert_eq!(state, ElementState::Selected);
        assert_eq!(serde_json::to_string(&ElementState::Displayed).unwrap(), "\"displayed\"");
    }
}
