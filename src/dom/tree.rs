use crate::browser::page::{ElementState, Page};
use crate::dom::element::{ElementNode, Node};
use crate::dom::html::parse_fragment;
use crate::dom::xpath::XPath;
use crate::error::{BrowserError, Result};
use indexmap::IndexMap;
use log::debug;

/// Smallest valid PNG (1x1, transparent), returned for screenshots
const BLANK_PNG: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49,
    0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

const DEFAULT_SCROLL_HEIGHT: f64 = 1000.0;

#[derive(Debug, Clone)]
pub(crate) enum NodeData {
    Document,
    Element { tag_name: String, attributes: IndexMap<String, String> },
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct TreeNode {
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) data: NodeData,
}

/// Handle to an element of a [`DomTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeElement {
    generation: u64,
    node: usize,
}

impl TreeElement {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Something that happened to a [`DomTree`] through the [`Page`] interface
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Click { tag_name: String, id: Option<String> },
    Keys(String),
    Navigate(String),
    StopLoading,
    Scroll(f64),
    Screenshot,
}

/// What clicking an element matched by an XPath does to the document
#[derive(Debug, Clone, PartialEq)]
pub enum ClickEffect {
    /// Detach the clicked element
    Remove,
    /// Load another document
    Navigate(String),
    SetAttribute(String, String),
    RemoveAttribute(String),
}

#[derive(Debug, Clone)]
struct Route {
    html: String,
    /// Never finishes loading on its own
    slow: bool,
}

/// In-memory document implementing [`Page`]
///
/// Parses HTML into an arena of nodes, evaluates XPath through [`XPath`] and logs every
/// interaction as a [`PageEvent`]. Navigation is served from registered routes; an unknown URL
/// loads an empty body. Used for tests and offline dry runs of task books.
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<TreeNode>,
    url: String,
    generation: u64,
    loading: bool,
    routes: IndexMap<String, Route>,
    click_effects: Vec<(String, ClickEffect)>,
    events: Vec<PageEvent>,
    scroll_y: f64,
    scroll_height: f64,
}

impl DomTree {
    /// Build a document whose `<body>` contains `root`
    pub fn new(root: ElementNode) -> Self {
        let mut tree = Self::empty();
        tree.load_nodes(vec![Node::Element(root)]);
        tree
    }

    /// Parse a document or fragment. Fragments are wrapped in `<html><body>`.
    pub fn parse(html: &str) -> Result<Self> {
        let mut tree = Self::empty();
        tree.load_nodes(parse_fragment(html)?);
        Ok(tree)
    }

    fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            url: "about:blank".to_string(),
            generation: 0,
            loading: false,
            routes: IndexMap::new(),
            click_effects: Vec::new(),
            events: Vec::new(),
            scroll_y: 0.0,
            scroll_height: DEFAULT_SCROLL_HEIGHT,
        }
    }

    /// Serve `html` when `url` is navigated to
    pub fn with_route(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.routes.insert(url.into(), Route { html: html.into(), slow: false });
        self
    }

    /// Like [`DomTree::with_route`], but the load only completes once stopped
    pub fn with_slow_route(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.routes.insert(url.into(), Route { html: html.into(), slow: true });
        self
    }

    /// Apply `effect` whenever an element selected by `xpath` is clicked
    pub fn on_click(mut self, xpath: impl Into<String>, effect: ClickEffect) -> Self {
        self.click_effects.push((xpath.into(), effect));
        self
    }

    pub fn with_scroll_height(mut self, height: f64) -> Self {
        self.scroll_height = height;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn events(&self) -> &[PageEvent] {
        &self.events
    }

    /// Text of every `send_keys` call, in order
    pub fn keys_sent(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                PageEvent::Keys(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn click_count(&self) -> usize {
        self.events.iter().filter(|event| matches!(event, PageEvent::Click { .. })).count()
    }

    pub fn scroll_y(&self) -> f64 {
        self.scroll_y
    }

    fn load_nodes(&mut self, top_level: Vec<Node>) {
        self.nodes.clear();
        self.nodes.push(TreeNode { parent: None, children: Vec::new(), data: NodeData::Document });

        let has_html = top_level.iter().any(|node| node.as_element().is_some_and(|e| e.is_tag("html")));
        if has_html {
            for node in top_level {
                if let Node::Element(element) = node {
                    self.insert(0, Node::Element(element));
                }
            }
        } else {
            let body = ElementNode { tag_name: "body".to_string(), attributes: IndexMap::new(), children: top_level };
            self.insert(0, Node::Element(ElementNode::new("html").with_child(body)));
        }

        self.scroll_y = 0.0;
    }

    /// Append `node` (and its subtree) under `parent`, allocating ids in document order
    fn insert(&mut self, parent: usize, node: Node) -> usize {
        let id = self.nodes.len();
        match node {
            Node::Text(text) => {
                self.nodes.push(TreeNode { parent: Some(parent), children: Vec::new(), data: NodeData::Text(text) });
            }
            Node::Element(element) => {
                self.nodes.push(TreeNode {
                    parent: Some(parent),
                    children: Vec::new(),
                    data: NodeData::Element { tag_name: element.tag_name, attributes: element.attributes },
                });
                for child in element.children {
                    self.insert(id, child);
                }
            }
        }
        self.nodes[parent].children.push(id);
        id
    }

    pub(crate) fn node(&self, id: usize) -> &TreeNode {
        &self.nodes[id]
    }

    pub(crate) fn tag_of(&self, id: usize) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { tag_name, .. } => Some(tag_name),
            _ => None,
        }
    }

    pub(crate) fn attribute_of(&self, id: usize, name: &str) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    pub(crate) fn element_children(&self, id: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes[id].children.iter().copied().filter(|child| self.tag_of(*child).is_some())
    }

    /// Direct text children
    pub(crate) fn text_children(&self, id: usize) -> Vec<String> {
        self.nodes[id]
            .children
            .iter()
            .filter_map(|child| match &self.nodes[*child].data {
                NodeData::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Concatenated descendant text
    pub(crate) fn string_value(&self, id: usize) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: usize, out: &mut String) {
        match &self.nodes[id].data {
            NodeData::Text(text) => out.push_str(text),
            _ => {
                for child in &self.nodes[id].children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Live element ids in document order
    fn live_elements(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_elements(0, &mut out);
        out
    }

    fn collect_elements(&self, id: usize, out: &mut Vec<usize>) {
        for child in self.element_children(id) {
            out.push(child);
            self.collect_elements(child, out);
        }
    }

    fn node_attached(&self, mut id: usize) -> bool {
        while let Some(parent) = self.nodes[id].parent {
            if !self.nodes[parent].children.contains(&id) {
                return false;
            }
            id = parent;
        }
        id == 0
    }

    fn handle(&self, node: usize) -> TreeElement {
        TreeElement { generation: self.generation, node }
    }

    fn check(&self, element: &TreeElement) -> Result<usize> {
        if element.generation != self.generation || element.node >= self.nodes.len() {
            return Err(BrowserError::ElementNotFound(
                "element belongs to a previous document".to_string(),
            ));
        }
        if !self.node_attached(element.node) {
            return Err(BrowserError::ElementNotFound("element is no longer attached".to_string()));
        }
        Ok(element.node)
    }

    fn to_element_node(&self, id: usize) -> Option<ElementNode> {
        let NodeData::Element { tag_name, attributes } = &self.nodes[id].data else {
            return None;
        };
        let children = self.nodes[id]
            .children
            .iter()
            .filter_map(|child| match &self.nodes[*child].data {
                NodeData::Text(text) => Some(Node::Text(text.clone())),
                NodeData::Element { .. } => self.to_element_node(*child).map(Node::Element),
                NodeData::Document => None,
            })
            .collect();
        Some(ElementNode { tag_name: tag_name.clone(), attributes: attributes.clone(), children })
    }

    fn is_hidden(&self, id: usize) -> bool {
        if self.attribute_of(id, "hidden").is_some() {
            return true;
        }
        if self.tag_of(id) == Some("input") && self.attribute_of(id, "type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")) {
            return true;
        }
        self.attribute_of(id, "style").is_some_and(|style| {
            let style: String = style.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_lowercase();
            style.contains("display:none") || style.contains("visibility:hidden")
        })
    }

    fn set_attribute(&mut self, id: usize, name: &str, value: String) {
        if let NodeData::Element { attributes, .. } = &mut self.nodes[id].data {
            attributes.insert(name.to_string(), value);
        }
    }

    fn remove_attribute(&mut self, id: usize, name: &str) {
        if let NodeData::Element { attributes, .. } = &mut self.nodes[id].data {
            attributes.shift_remove(name);
        }
    }

    fn detach(&mut self, id: usize) {
        if let Some(parent) = self.nodes[id].parent {
            self.nodes[parent].children.retain(|child| *child != id);
        }
    }

    fn load(&mut self, url: &str) -> Result<()> {
        self.url = url.to_string();
        self.generation += 1;

        let route = self.routes.get(url).cloned();
        match route {
            Some(route) => {
                self.load_nodes(parse_fragment(&route.html)?);
                self.loading = route.slow;
            }
            None => {
                debug!("No route for {}, loading an empty document", url);
                self.load_nodes(Vec::new());
                self.loading = false;
            }
        }
        Ok(())
    }

    fn default_click(&mut self, id: usize) -> Result<()> {
        let tag_name = self.tag_of(id).map(str::to_string);
        match tag_name.as_deref() {
            Some("a") => {
                if let Some(href) = self.attribute_of(id, "href").map(str::to_string) {
                    self.load(&href)?;
                }
            }
            Some("input") => match self.attribute_of(id, "type").map(str::to_ascii_lowercase).as_deref() {
                Some("checkbox") => {
                    if self.attribute_of(id, "checked").is_some() {
                        self.remove_attribute(id, "checked");
                    } else {
                        self.set_attribute(id, "checked", String::new());
                    }
                }
                Some("radio") => {
                    let name = self.attribute_of(id, "name").map(str::to_string);
                    if let Some(name) = name {
                        for other in self.live_elements() {
                            if other != id && self.attribute_of(other, "name") == Some(name.as_str()) {
                                self.remove_attribute(other, "checked");
                            }
                        }
                    }
                    self.set_attribute(id, "checked", String::new());
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }
}

impl Page for DomTree {
    type Element = TreeElement;

    fn find_by_id(&self, id: &str) -> Result<Vec<TreeElement>> {
        Ok(self
            .live_elements()
            .into_iter()
            .filter(|node| self.attribute_of(*node, "id") == Some(id))
            .map(|node| self.handle(node))
            .collect())
    }

    fn find_by_xpath(&self, xpath: &str) -> Result<Vec<TreeElement>> {
        let expr = XPath::parse(xpath)?;
        Ok(expr.select(self)?.into_iter().map(|node| self.handle(node)).collect())
    }

    fn tag_name(&self, element: &TreeElement) -> Result<String> {
        let id = self.check(element)?;
        Ok(self.tag_of(id).unwrap_or_default().to_string())
    }

    fn text(&self, element: &TreeElement) -> Result<String> {
        Ok(self.string_value(self.check(element)?))
    }

    fn outer_html(&self, element: &TreeElement) -> Result<String> {
        let id = self.check(element)?;
        Ok(self.to_element_node(id).map(|node| node.to_html()).unwrap_or_default())
    }

    fn attribute(&self, element: &TreeElement, name: &str) -> Result<Option<String>> {
        let id = self.check(element)?;
        Ok(self.attribute_of(id, &name.to_ascii_lowercase()).map(str::to_string))
    }

    fn state(&self, element: &TreeElement, state: ElementState) -> Result<bool> {
        let id = self.check(element)?;
        Ok(match state {
            ElementState::Displayed => {
                let mut current = Some(id);
                while let Some(node) = current {
                    if self.is_hidden(node) {
                        return Ok(false);
                    }
                    current = self.nodes[node].parent;
                }
                true
            }
            ElementState::Enabled => self.attribute_of(id, "disabled").is_none(),
            ElementState::Selected => {
                self.attribute_of(id, "checked").is_some() || self.attribute_of(id, "selected").is_some()
            }
        })
    }

    fn is_attached(&self, element: &TreeElement) -> Result<bool> {
        Ok(element.generation == self.generation
            && element.node < self.nodes.len()
            && self.node_attached(element.node))
    }

    fn click(&mut self, element: &TreeElement) -> Result<()> {
        let id = self.check(element)?;
        self.events.push(PageEvent::Click {
            tag_name: self.tag_of(id).unwrap_or_default().to_string(),
            id: self.attribute_of(id, "id").map(str::to_string),
        });

        let mut effects = Vec::new();
        for (xpath, effect) in &self.click_effects {
            if XPath::parse(xpath)?.select(self)?.contains(&id) {
                effects.push(effect.clone());
            }
        }

        if effects.is_empty() {
            return self.default_click(id);
        }

        for effect in effects {
            match effect {
                ClickEffect::Remove => self.detach(id),
                ClickEffect::Navigate(url) => self.load(&url)?,
                ClickEffect::SetAttribute(name, value) => self.set_attribute(id, &name, value),
                ClickEffect::RemoveAttribute(name) => self.remove_attribute(id, &name),
            }
        }
        Ok(())
    }

    fn send_keys(&mut self, element: &TreeElement, text: &str) -> Result<()> {
        let id = self.check(element)?;
        let mut value = self.attribute_of(id, "value").unwrap_or_default().to_string();
        value.push_str(text);
        self.set_attribute(id, "value", value);
        self.events.push(PageEvent::Keys(text.to_string()));
        Ok(())
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        self.events.push(PageEvent::Navigate(url.to_string()));
        self.load(url)?;
        if self.loading {
            return Err(BrowserError::NavigationTimeout { url: url.to_string() });
        }
        Ok(())
    }

    fn stop_loading(&mut self) -> Result<()> {
        self.loading = false;
        self.events.push(PageEvent::StopLoading);
        Ok(())
    }

    fn is_ready(&self) -> Result<bool> {
        Ok(!self.loading)
    }

    fn body_html(&self) -> Result<String> {
        let body = self.live_elements().into_iter().find(|node| self.tag_of(*node) == Some("body"));
        Ok(body.and_then(|node| self.to_element_node(node)).map(|node| node.to_html()).unwrap_or_default())
    }

    fn scroll_height(&self) -> Result<f64> {
        Ok(self.scroll_height)
    }

    fn scroll_to(&mut self, y: f64) -> Result<()> {
        self.scroll_y = y.clamp(0.0, self.scroll_height);
        self.events.push(PageEvent::Scroll(self.scroll_y));
        Ok(())
    }

    fn screenshot(&mut self, center_on: Option<&TreeElement>) -> Result<Vec<u8>> {
        if let Some(element) = center_on {
            self.check(element)?;
        }
        self.events.push(PageEvent::Screenshot);
        Ok(BLANK_PNG.to_vec())
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tree() -> DomTree {
        DomTree::parse(
            r#"<header><button id="nav-btn">Menu</button></header>
            <main>
                <a href="/page">Click here</a>
                <div class="content" style="display: none"><span>Some text</span></div>
                <input type="checkbox" id="agree">
                <button id="save" disabled>Save</button>
            </main>"#,
        )
        .unwrap()
        .with_route("/page", "<h1 id='title'>Second page</h1>")
    }

    #[test]
    fn test_fragment_is_wrapped_in_body() {
        let tree = create_test_tree();
        let body = tree.body_html().unwrap();
        assert!(body.starts_with("<body>"));
        assert_eq!(tree.find_by_xpath("/html/body/header/button").unwrap().len(), 1);
    }

    #[test]
    fn test_find_by_id_and_read() {
        let tree = create_test_tree();
        let found = tree.find_by_id("nav-btn").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(tree.tag_name(&found[0]).unwrap(), "button");
        assert_eq!(tree.text(&found[0]).unwrap(), "Menu");
        assert_eq!(tree.outer_html(&found[0]).unwrap(), "<button id=\"nav-btn\">Menu</button>");
        assert!(tree.find_by_id("missing").unwrap().is_empty());
    }

    #[test]
    fn test_element_states() {
        let tree = create_test_tree();
        let span = tree.find_by_xpath("//span").unwrap()[0];
        let save = tree.find_by_id("save").unwrap()[0];
        let nav = tree.find_by_id("nav-btn").unwrap()[0];

        assert!(!tree.state(&span, ElementState::Displayed).unwrap());
        assert!(tree.state(&nav, ElementState::Displayed).unwrap());
        assert!(!tree.state(&save, ElementState::Enabled).unwrap());
        assert!(tree.state(&nav, ElementState::Enabled).unwrap());
    }

    #[test]
    fn test_checkbox_click_toggles_selection() {
        let mut tree = create_test_tree();
        let agree = tree.find_by_id("agree").unwrap()[0];

        assert!(!tree.state(&agree, ElementState::Selected).unwrap());
        tree.click(&agree).unwrap();
        assert!(tree.state(&agree, ElementState::Selected).unwrap());
        tree.click(&agree).unwrap();
        assert!(!tree.state(&agree, ElementState::Selected).unwrap());
        assert_eq!(tree.click_count(), 2);
    }

    #[test]
    fn test_link_click_replaces_document() {
        let mut tree = create_test_tree();
        let link = tree.find_by_xpath("//a").unwrap()[0];
        let before = tree.generation();

        tree.click(&link).unwrap();

        assert_eq!(tree.url(), "/page");
        assert!(tree.generation() > before);
        assert_eq!(tree.find_by_id("title").unwrap().len(), 1);
        assert!(matches!(tree.text(&link), Err(BrowserError::ElementNotFound(_))));
    }

    #[test]
    fn test_click_effects() {
        let mut tree = DomTree::parse("<ul><li>a</li><li>b</li></ul><button id='b'>x</button>")
            .unwrap()
            .on_click("//li", ClickEffect::Remove)
            .on_click("//button", ClickEffect::SetAttribute("aria-pressed".into(), "true".into()));

        let first = tree.find_by_xpath("//li").unwrap()[0];
        tree.click(&first).unwrap();
        assert_eq!(tree.find_by_xpath("//li").unwrap().len(), 1);
        assert!(!tree.is_attached(&first).unwrap());
        assert!(matches!(tree.click(&first), Err(BrowserError::ElementNotFound(_))));
        assert!(matches!(tree.state(&first, ElementState::Displayed), Err(BrowserError::ElementNotFound(_))));

        let button = tree.find_by_id("b").unwrap()[0];
        tree.click(&button).unwrap();
        assert_eq!(tree.attribute(&button, "aria-pressed").unwrap(), Some("true".to_string()));
    }

    #[test]
    fn test_send_keys_appends_value() {
        let mut tree = DomTree::parse("<input name='q'>").unwrap();
        let input = tree.find_by_xpath("//input").unwrap()[0];
        tree.send_keys(&input, "h").unwrap();
        tree.send_keys(&input, "i").unwrap();

        assert_eq!(tree.attribute(&input, "value").unwrap(), Some("hi".to_string()));
        assert_eq!(tree.keys_sent(), vec!["h", "i"]);
    }

    #[test]
    fn test_slow_route_times_out_until_stopped() {
        let mut tree = DomTree::parse("<p>start</p>").unwrap().with_slow_route("https://slow.test", "<p>slow</p>");

        let err = tree.navigate("https://slow.test").unwrap_err();
        assert!(err.is_timeout());
        assert!(!tree.is_ready().unwrap());

        tree.stop_loading().unwrap();
        assert!(tree.is_ready().unwrap());
        assert_eq!(tree.events().last(), Some(&PageEvent::StopLoading));
    }

    #[test]
    fn test_unknown_route_loads_empty_body() {
        let mut tree = create_test_tree();
        tree.navigate("https://nowhere.test").unwrap();
        assert_eq!(tree.body_html().unwrap(), "<body></body>");
    }

    #[test]
    fn test_scroll_and_screenshot() {
        let mut tree = create_test_tree().with_scroll_height(500.0);
        tree.scroll_to(800.0).unwrap();
        assert_eq!(tree.scroll_y(), 500.0);

        let png = tree.screenshot(None).unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
    }
}
