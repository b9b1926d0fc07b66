//! Read-only actions. They never wait on the page.

use crate::browser::page::Page;
use crate::error::Result;
use crate::tools::{Tool, ToolContext, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Read actions take no arguments
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReadParams {}

/// Rendered text of the target element
#[derive(Default)]
pub struct GetTextTool;

impl<P: Page> Tool<P> for GetTextTool {
    type Params = ReadParams;

    fn name(&self) -> &str {
        "get_text"
    }

    fn execute_typed(&self, _params: ReadParams, context: &mut ToolContext<'_, P>) -> Result<ToolResult> {
        let element = context.element("get_text")?;
        Ok(ToolResult::success_with(context.page.text(element)?))
    }
}

/// Outer HTML of the target element
#[derive(Default)]
pub struct GetHtmlTool;

impl<P: Page> Tool<P> for GetHtmlTool {
    type Params = ReadParams;

    fn name(&self) -> &str {
        "get_html"
    }

    fn execute_typed(&self, _params: ReadParams, context: &mut ToolContext<'_, P>) -> Result<ToolResult> {
        let element = context.element("get_html")?;
        Ok(ToolResult::success_with(context.page.outer_html(element)?))
    }
}
