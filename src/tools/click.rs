use crate::browser::page::Page;
use crate::error::{BrowserError, Result};
use crate::tools::{Tool, ToolContext, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The click action takes no arguments
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClickParams {}

/// Click the target element and wait for the page to settle
#[derive(Default)]
pub struct ClickTool;

impl<P: Page> Tool<P> for ClickTool {
    type Params = ClickParams;

    fn name(&self) -> &str {
        "click"
    }

    fn execute_typed(&self, _params: ClickParams, context: &mut ToolContext<'_, P>) -> Result<ToolResult> {
        let element = context.element("click")?;
        context.page.click(element).map_err(|e| BrowserError::ToolExecutionFailed {
            tool: "click".to_string(),
            reason: e.to_string(),
        })?;
        context.wait_for_ready()?;

        Ok(ToolResult::success())
    }
}
