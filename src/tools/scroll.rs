use crate::browser::page::Page;
use crate::error::{BrowserError, Result};
use crate::tools::{Tool, ToolContext, ToolResult};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Pause after a scroll when `wait_interval` is not given, in seconds
pub const DEFAULT_WAIT_INTERVAL: f64 = 3.0;

/// Smallest step height; anything below scrolls at this rate
const MIN_STEP_HEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    /// Towards the bottom of the document
    #[default]
    Down,
    /// Back to the top
    Up,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ScrollParams {
    #[serde(default)]
    pub direction: ScrollDirection,

    /// Pixels per step; scrolls in one jump when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_height: Option<f64>,

    /// Seconds to pause after each step (default: 3)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_interval: Option<f64>,
}

impl ScrollParams {
    fn interval(&self) -> Result<Duration> {
        let secs = self.wait_interval.unwrap_or(DEFAULT_WAIT_INTERVAL);
        Duration::try_from_secs_f64(secs).map_err(|_| BrowserError::InvalidArguments {
            tool: "scroll".to_string(),
            reason: format!("wait_interval must be a non-negative number of seconds, got {}", secs),
        })
    }

    fn step(&self) -> Option<f64> {
        self.step_height.filter(|step| *step > 0.0).map(|step| step.max(MIN_STEP_HEIGHT))
    }
}

/// Scroll the page to its bottom or top, optionally in steps
#[derive(Default)]
pub struct ScrollTool;

impl<P: Page> Tool<P> for ScrollTool {
    type Params = ScrollParams;

    fn name(&self) -> &str {
        "scroll"
    }

    fn requires_element(&self) -> bool {
        false
    }

    fn execute_typed(&self, params: ScrollParams, context: &mut ToolContext<'_, P>) -> Result<ToolResult> {
        let height = context.page.scroll_height()?;
        let (mut position, goal) = match params.direction {
            ScrollDirection::Down => (0.0, height),
            ScrollDirection::Up => (height, 0.0),
        };
        let interval = params.interval()?;

        match params.step() {
            Some(step) => {
                let mut steps = 0;
                while position != goal {
                    position = match params.direction {
                        ScrollDirection::Down => (position + step).min(goal),
                        ScrollDirection::Up => (position - step).max(goal),
                    };
                    context.page.scroll_to(position)?;
                    steps += 1;
                    if !interval.is_zero() {
                        thread::sleep(interval);
                    }
                }
                debug!("Scrolled {:?} to {} in {} steps", params.direction, goal, steps);
            }
            None => {
                context.page.scroll_to(goal)?;
                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            }
        }

        Ok(ToolResult::success_with(serde_json::json!({ "position": goal })))
    }
}
