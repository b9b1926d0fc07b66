use crate::browser::page::Page;
use crate::error::Result;
use crate::tools::utils::normalize_url;
use crate::tools::{Tool, ToolContext, ToolResult};
use log::{info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Parameters for the open_url tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OpenUrlParams {
    /// URL to open; a missing scheme is filled in
    pub url: String,

    /// Extra seconds to wait once the navigation returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_after_opening_url: Option<f64>,
}

/// Tool for navigating to a URL
///
/// A load that does not finish in time is stopped and the task carries on with whatever the page
/// managed to render.
#[derive(Default)]
pub struct OpenUrlTool;

impl<P: Page> Tool<P> for OpenUrlTool {
    type Params = OpenUrlParams;

    fn name(&self) -> &str {
        "open_url"
    }

    fn requires_element(&self) -> bool {
        false
    }

    fn execute_typed(&self, params: OpenUrlParams, context: &mut ToolContext<'_, P>) -> Result<ToolResult> {
        let url = normalize_url(&params.url);
        info!("Opening {}", url);

        match context.page.navigate(&url) {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                warn!("{}, stopping the load", e);
                context.page.stop_loading()?;
            }
            Err(e) => return Err(e),
        }

        if let Some(seconds) = params.wait_after_opening_url.filter(|s| *s > 0.0) {
            thread::sleep(Duration::from_secs_f64(seconds));
        }
        context.wait_for_ready()?;

        Ok(ToolResult::success())
    }
}
