//! Actions a task can run against a page
//!
//! Each action is a [`Tool`] with a typed, JSON-deserializable parameter struct. The
//! [`ToolRegistry`] erases the parameter type so actions can be looked up by the name used in a
//! task book and driven with raw JSON `args`.

pub mod click;
pub mod input;
pub mod navigate;
pub mod read;
pub mod scroll;
pub mod utils;

pub use click::{ClickParams, ClickTool};
pub use input::{InputTextParams, InputTextTool};
pub use navigate::{OpenUrlParams, OpenUrlTool};
pub use read::{GetHtmlTool, GetTextTool, ReadParams};
pub use scroll::{ScrollDirection, ScrollParams, ScrollTool};

use crate::browser::page::Page;
use crate::error::{BrowserError, Result};
use crate::task::pacing::Pacer;
use indexmap::IndexMap;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::thread;
use std::time::{Duration, Instant};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(20);

/// Outcome of one tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success() -> Self {
        Self { success: true, data: None, error: None }
    }

    pub fn success_with(data: impl Into<Value>) -> Self {
        Self { success: true, data: Some(data.into()), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }
}

/// Everything a tool may touch while it runs
pub struct ToolContext<'a, P: Page> {
    pub page: &'a mut P,

    /// Element the action was resolved to, if it has a target
    pub element: Option<&'a P::Element>,

    pub pacer: &'a mut Pacer,

    /// How long to wait for the document to report ready
    pub load_timeout: Duration,
}

impl<'a, P: Page> ToolContext<'a, P> {
    pub fn new(page: &'a mut P, pacer: &'a mut Pacer) -> Self {
        Self { page, element: None, pacer, load_timeout: DEFAULT_LOAD_TIMEOUT }
    }

    pub fn with_element(mut self, element: Option<&'a P::Element>) -> Self {
        self.element = element;
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// The target element, or an error naming the tool that needed it
    pub fn element(&self, tool: &str) -> Result<&'a P::Element> {
        self.element
            .ok_or_else(|| BrowserError::ElementNotFound(format!("'{}' was run without a target element", tool)))
    }

    /// Block until the document reports ready, then pause for the settle delay.
    ///
    /// Returns `false` if the load had to be stopped after `load_timeout`.
    pub fn wait_for_ready(&mut self) -> Result<bool> {
        let started = Instant::now();
        let ready = loop {
            if self.page.is_ready()? {
                break true;
            }
            if started.elapsed() >= self.load_timeout {
                break false;
            }
            thread::sleep(READY_POLL_INTERVAL);
        };

        if ready {
            debug!("Page ready after {:?}", started.elapsed());
        } else {
            warn!("Page still loading after {:?}, stopping the load", self.load_timeout);
            self.page.stop_loading()?;
        }
        self.pacer.pause_after_load();
        Ok(ready)
    }
}

/// An action with typed parameters
pub trait Tool<P: Page> {
    type Params: DeserializeOwned + JsonSchema;

    /// Name used in task books
    fn name(&self) -> &str;

    /// Whether the action runs against a resolved element
    fn requires_element(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(Self::Params)).unwrap_or_default()
    }

    fn execute_typed(&self, params: Self::Params, context: &mut ToolContext<'_, P>) -> Result<ToolResult>;
}

/// Object-safe view of a [`Tool`] driven by raw JSON arguments
pub trait DynTool<P: Page> {
    fn name(&self) -> &str;

    fn requires_element(&self) -> bool;

    fn parameters_schema(&self) -> Value;

    /// Check that `args` deserialize into the tool's parameters
    fn validate(&self, args: Option<&Value>) -> Result<()>;

    fn execute(&self, args: Option<&Value>, context: &mut ToolContext<'_, P>) -> Result<ToolResult>;
}

impl<P: Page, T: Tool<P>> DynTool<P> for T {
    fn name(&self) -> &str {
        <T as Tool<P>>::name(self)
    }

    fn requires_element(&self) -> bool {
        <T as Tool<P>>::requires_element(self)
    }

    fn parameters_schema(&self) -> Value {
        <T as Tool<P>>::parameters_schema(self)
    }

    fn validate(&self, args: Option<&Value>) -> Result<()> {
        parse_params::<T::Params>(<T as Tool<P>>::name(self), args).map(|_| ())
    }

    fn execute(&self, args: Option<&Value>, context: &mut ToolContext<'_, P>) -> Result<ToolResult> {
        let params = parse_params::<T::Params>(<T as Tool<P>>::name(self), args)?;
        self.execute_typed(params, context)
    }
}

/// Absent or `null` arguments are read as an empty object
fn parse_params<T: DeserializeOwned>(tool: &str, args: Option<&Value>) -> Result<T> {
    let value = match args {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(value) => value.clone(),
    };
    serde_json::from_value(value)
        .map_err(|e| BrowserError::InvalidArguments { tool: tool.to_string(), reason: e.to_string() })
}

/// Tools by name, in registration order
pub struct ToolRegistry<P: Page> {
    tools: IndexMap<String, Box<dyn DynTool<P>>>,
}

impl<P: Page> Default for ToolRegistry<P> {
    fn default() -> Self {
        Self { tools: IndexMap::new() }
    }
}

impl<P: Page> ToolRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in action
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ClickTool);
        registry.register(InputTextTool);
        registry.register(OpenUrlTool);
        registry.register(GetTextTool);
        registry.register(GetHtmlTool);
        registry.register(ScrollTool);
        registry
    }

    /// Add `tool`, replacing any tool of the same name
    pub fn register<T: Tool<P> + 'static>(&mut self, tool: T) {
        let name = <T as Tool<P>>::name(&tool).to_string();
        self.tools.insert(name, Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn DynTool<P>> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    pub fn execute(&self, name: &str, args: Option<&Value>, context: &mut ToolContext<'_, P>) -> Result<ToolResult> {
        let tool = self.get(name).ok_or_else(|| BrowserError::UnknownTool(name.to_string()))?;
        debug!("Executing '{}' with args {:?}", name, args);
        tool.execute(args, context)
    }
}
