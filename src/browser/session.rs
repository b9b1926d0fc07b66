use crate::{browser::config::{ConnectionOptions, LaunchOptions},
            browser::page::{ElementState, Page},
            error::{BrowserError, Result}};
use headless_chrome::{Browser, Tab, protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport}};
use serde_json::Value;
use std::{cell::{Cell, RefCell},
          ffi::OsStr,
          sync::Arc,
          time::Duration};

/// Installs the per-document element registry and returns the document token.
/// A fresh token means the document has been replaced since the last call.
const REGISTRY_JS: &str = r#"
    (function() {
        if (!window.__browserTasks) {
            window.__browserTasks = { token: Math.random().toString(36).slice(2), nodes: [] };
        }
        return window.__browserTasks.token;
    })()
"#;

/// Handle to an element registered in the page's element registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromeElement {
    /// Document generation the element was found in
    pub generation: u64,

    /// Slot in `window.__browserTasks.nodes`
    pub slot: usize,
}

/// Browser session that manages a Chrome/Chromium instance
pub struct BrowserSession {
    /// The underlying headless_chrome Browser instance
    browser: Browser,

    /// Tab all page operations run against
    tab: Arc<Tab>,

    load_timeout: Duration,

    generation: Cell<u64>,

    document_token: RefCell<Option<String>>,
}

impl BrowserSession {
    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Ignore default arguments to prevent detection by anti-bot services
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // Replays with long pacing delays must not be closed as idle
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.sandbox = options.sandbox;

        if let Some(path) = options.chrome_path.clone() {
            launch_opts.path = Some(path);
        }

        if let Some(dir) = options.user_data_dir.clone() {
            launch_opts.user_data_dir = Some(dir);
        }

        let browser = Browser::new(launch_opts).map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::LaunchFailed(format!("Failed to create tab: {}", e)))?;

        Ok(Self::with_tab(browser, tab, options.load_timeout_duration()))
    }

    /// Connect to an existing browser instance via WebSocket
    pub fn connect(options: ConnectionOptions) -> Result<Self> {
        let browser = Browser::connect(options.ws_url).map_err(|e| BrowserError::ConnectionFailed(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::TabOperationFailed(format!("Failed to create tab: {}", e)))?;

        Ok(Self::with_tab(browser, tab, Duration::from_millis(options.timeout)))
    }

    fn with_tab(browser: Browser, tab: Arc<Tab>, load_timeout: Duration) -> Self {
        tab.set_default_timeout(load_timeout);
        Self { browser, tab, load_timeout, generation: Cell::new(0), document_token: RefCell::new(None) }
    }

    /// Get the tab this session drives
    pub fn tab(&self) -> &Arc<Tab> {
        &self.tab
    }

    /// Get the underlying Browser instance
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn load_timeout(&self) -> Duration {
        self.load_timeout
    }

    /// Evaluate an expression that returns a JSON string and parse it
    fn evaluate_json(&self, expression: &str) -> Result<Value> {
        let result = self
            .tab
            .evaluate(expression, false)
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;

        match result.value {
            Some(Value::String(json)) => Ok(serde_json::from_str(&json)?),
            Some(other) => Ok(other),
            None => Ok(Value::Null),
        }
    }

    /// Run `body` with `el` bound to the registered element. `body` must `return` a JSON-able value.
    fn eval_on(&self, element: &ChromeElement, body: &str) -> Result<Value> {
        self.sync_generation();
        if element.generation != self.generation.get() {
            return Err(BrowserError::ElementNotFound(format!(
                "element {} belongs to a replaced document",
                element.slot
            )));
        }

        let script = format!(
            r#"(function() {{
                const reg = window.__browserTasks;
                const el = reg && reg.nodes[{slot}];
                if (!el || !el.isConnected) {{ return JSON.stringify({{ stale: true }}); }}
                const value = (function(el) {{ {body} }})(el);
                return JSON.stringify({{ stale: false, value: value === undefined ? null : value }});
            }})()"#,
            slot = element.slot,
            body = body
        );

        let mut result = self.evaluate_json(&script)?;
        if result.get("stale").and_then(Value::as_bool).unwrap_or(true) {
            return Err(BrowserError::ElementNotFound(format!("element {} is no longer attached", element.slot)));
        }
        Ok(result.get_mut("value").map(Value::take).unwrap_or(Value::Null))
    }

    /// Register every element matched by `collect` (a JS expression yielding an array of nodes)
    fn register(&self, collect: &str) -> Result<Vec<ChromeElement>> {
        self.sync_generation();
        let script = format!(
            r#"(function() {{
                {registry};
                const reg = window.__browserTasks;
                const found = {collect};
                if (!Array.isArray(found)) {{ return JSON.stringify({{ error: String(found) }}); }}
                const slots = [];
                for (const el of found) {{
                    let slot = reg.nodes.indexOf(el);
                    if (slot < 0) {{ slot = reg.nodes.push(el) - 1; }}
                    slots.push(slot);
                }}
                return JSON.stringify(slots);
            }})()"#,
            registry = REGISTRY_JS.trim(),
            collect = collect
        );

        let result = self.evaluate_json(&script)?;
        if let Some(error) = result.get("error").and_then(Value::as_str) {
            return Err(BrowserError::EvaluationFailed(error.to_string()));
        }
        let slots: Vec<usize> = serde_json::from_value(result)?;
        let generation = self.generation.get();
        Ok(slots.into_iter().map(|slot| ChromeElement { generation, slot }).collect())
    }

    /// Compare the page's document token with the last one seen and bump the generation on change
    fn sync_generation(&self) {
        let token = match self.tab.evaluate(REGISTRY_JS, false) {
            Ok(remote) => remote.value.and_then(|v| v.as_str().map(str::to_string)),
            Err(e) => {
                log::debug!("Failed to read document token: {}", e);
                None
            }
        };

        let Some(token) = token else { return };
        let mut known = self.document_token.borrow_mut();
        if known.as_deref() != Some(token.as_str()) {
            if known.is_some() {
                self.generation.set(self.generation.get() + 1);
                log::debug!("Document replaced, generation is now {}", self.generation.get());
            }
            *known = Some(token);
        }
    }

    /// Close the browser's tabs
    pub fn close(&self) -> Result<()> {
        // The browser process itself is shut down when `Browser` is dropped
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| BrowserError::TabOperationFailed(format!("Failed to get tabs: {}", e)))?
            .clone();
        for tab in tabs {
            let _ = tab.close(false);
        }
        Ok(())
    }
}

/// Quote a Rust string as a JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

impl Page for BrowserSession {
    type Element = ChromeElement;

    fn find_by_id(&self, id: &str) -> Result<Vec<ChromeElement>> {
        // getElementById only returns the first match; duplicates are legal in the wild
        self.register(&format!("Array.from(document.querySelectorAll('[id]')).filter(e => e.id === {})", js_string(id)))
    }

    fn find_by_xpath(&self, xpath: &str) -> Result<Vec<ChromeElement>> {
        let collect = format!(
            r#"(function() {{
                let snapshot;
                try {{
                    snapshot = document.evaluate({xpath}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                }} catch (e) {{
                    return e.message;
                }}
                const out = [];
                for (let i = 0; i < snapshot.snapshotLength; i++) {{
                    const node = snapshot.snapshotItem(i);
                    if (node.nodeType === Node.ELEMENT_NODE) {{ out.push(node); }}
                }}
                return out;
            }})()"#,
            xpath = js_string(xpath)
        );

        self.register(&collect).map_err(|e| match e {
            BrowserError::EvaluationFailed(reason) => {
                BrowserError::InvalidSelector { selector: xpath.to_string(), reason }
            }
            other => other,
        })
    }

    fn tag_name(&self, element: &ChromeElement) -> Result<String> {
        let value = self.eval_on(element, "return el.tagName.toLowerCase();")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn text(&self, element: &ChromeElement) -> Result<String> {
        let value = self.eval_on(element, "return el.innerText !== undefined ? el.innerText : el.textContent;")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn outer_html(&self, element: &ChromeElement) -> Result<String> {
        let value = self.eval_on(element, "return el.outerHTML;")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn attribute(&self, element: &ChromeElement, name: &str) -> Result<Option<String>> {
        let value = self.eval_on(element, &format!("return el.getAttribute({});", js_string(name)))?;
        Ok(value.as_str().map(str::to_string))
    }

    fn state(&self, element: &ChromeElement, state: ElementState) -> Result<bool> {
        let body = match state {
            ElementState::Displayed => {
                r#"const style = window.getComputedStyle(el);
                   const rect = el.getBoundingClientRect();
                   return style.display !== 'none' && style.visibility !== 'hidden'
                       && parseFloat(style.opacity || '1') > 0 && rect.width > 0 && rect.height > 0;"#
            }
            ElementState::Enabled => "return !el.disabled;",
            ElementState::Selected => "return !!(el.checked || el.selected);",
        };
        Ok(self.eval_on(element, body)?.as_bool().unwrap_or(false))
    }

    fn is_attached(&self, element: &ChromeElement) -> Result<bool> {
        match self.eval_on(element, "return el.isConnected;") {
            Ok(_) => Ok(true),
            Err(BrowserError::ElementNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn click(&mut self, element: &ChromeElement) -> Result<()> {
        self.eval_on(element, "el.scrollIntoView({block: 'center', inline: 'center'}); el.click(); return true;")
            .map_err(|e| BrowserError::ToolExecutionFailed { tool: "click".to_string(), reason: e.to_string() })?;
        Ok(())
    }

    fn send_keys(&mut self, element: &ChromeElement, text: &str) -> Result<()> {
        self.eval_on(element, "el.focus(); return true;")?;
        self.tab
            .type_str(text)
            .map_err(|e| BrowserError::ToolExecutionFailed { tool: "input_text".to_string(), reason: e.to_string() })?;
        Ok(())
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| BrowserError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;

        self.tab.wait_until_navigated().map_err(|e| {
            log::debug!("wait_until_navigated failed for {}: {}", url, e);
            BrowserError::NavigationTimeout { url: url.to_string() }
        })?;

        self.sync_generation();
        Ok(())
    }

    fn stop_loading(&mut self) -> Result<()> {
        self.tab
            .evaluate("window.stop();", false)
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        Ok(())
    }

    fn is_ready(&self) -> Result<bool> {
        let result = self
            .tab
            .evaluate("document.readyState", false)
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        Ok(result.value.as_ref().and_then(Value::as_str) == Some("complete"))
    }

    fn body_html(&self) -> Result<String> {
        let value = self.evaluate_json("JSON.stringify(document.body ? document.body.outerHTML : '')")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn scroll_height(&self) -> Result<f64> {
        let value = self.evaluate_json("JSON.stringify(document.body.parentNode.scrollHeight)")?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    fn scroll_to(&mut self, y: f64) -> Result<()> {
        self.tab
            .evaluate(&format!("window.scrollTo(0, {});", y), false)
            .map_err(|e| BrowserError::EvaluationFailed(e.to_string()))?;
        Ok(())
    }

    fn screenshot(&mut self, center_on: Option<&ChromeElement>) -> Result<Vec<u8>> {
        if let Some(element) = center_on {
            // Best effort: a stale target should not prevent the snapshot
            if let Err(e) = self.eval_on(element, "el.scrollIntoView({block: 'center', inline: 'center'}); return true;") {
                log::debug!("Could not center element {} for screenshot: {}", element.slot, e);
            }
        }

        // Clip to the whole scrollable document, not just the visible part
        let size = self.evaluate_json(
            "JSON.stringify({ width: document.documentElement.scrollWidth, height: document.documentElement.scrollHeight })",
        )?;
        let dimension = |key: &str| size.get(key).and_then(Value::as_f64).filter(|v| *v > 0.0);
        let clip = match (dimension("width"), dimension("height")) {
            (Some(width), Some(height)) => Some(Viewport { x: 0.0, y: 0.0, width, height, scale: 1.0 }),
            _ => None,
        };

        self.tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, clip, true)
            .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))
    }

    fn generation(&self) -> u64 {
        self.sync_generation();
        self.generation.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_options_builder() {
        let opts = LaunchOptions::new().headless(true).window_size(800, 600);

        assert!(opts.headless);
        assert_eq!(opts.window_width, 800);
        assert_eq!(opts.window_height, 600);
    }

    #[test]
    fn test_connection_options() {
        let opts = ConnectionOptions::new("ws://localhost:9222").timeout(5000);

        assert_eq!(opts.ws_url, "ws://localhost:9222");
        assert_eq!(opts.timeout, 5000);
    }

    #[test]
    fn test_js_string_escaping() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(js_string("//a[@id='x']"), "\"//a[@id='x']\"");
    }

    // Integration tests (require Chrome to be installed)
    #[test]
    #[ignore] // Ignore by default, run with: cargo test -- --ignored
    fn test_launch_browser() {
        let result = BrowserSession::launch(LaunchOptions::new().headless(true));
        assert!(result.is_ok());
    }

    #[test]
    #[ignore]
    fn test_generation_bumps_on_navigation() {
        let mut session =
            BrowserSession::launch(LaunchOptions::new().headless(true)).expect("Failed to launch browser");

        session.navigate("data:text/html,<p id='a'>first</p>").expect("Failed to navigate");
        let before = session.generation();
        session.navigate("data:text/html,<p id='a'>second</p>").expect("Failed to navigate");

        assert!(session.generation() > before);
    }
}
