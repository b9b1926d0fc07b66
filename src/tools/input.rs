use crate::browser::page::Page;
use crate::error::{BrowserError, Result};
use crate::tools::{Tool, ToolContext, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InputTextParams {
    /// Text to type into the element
    pub text: String,

    /// Shortest pause after each character, in seconds (default: pacing key delay)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_delay: Option<f64>,

    /// Longest pause after each character, in seconds (default: pacing key delay)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<f64>,
}

/// Focus the element, then type one character at a time with a random pause after each
#[derive(Default)]
pub struct InputTextTool;

impl<P: Page> Tool<P> for InputTextTool {
    type Params = InputTextParams;

    fn name(&self) -> &str {
        "input_text"
    }

    fn execute_typed(&self, params: InputTextParams, context: &mut ToolContext<'_, P>) -> Result<ToolResult> {
        let element = context.element("input_text")?;

        let failed = |e: BrowserError| BrowserError::ToolExecutionFailed {
            tool: "input_text".to_string(),
            reason: e.to_string(),
        };

        context.page.click(element).map_err(failed)?;
        let mut buffer = [0u8; 4];
        for c in params.text.chars() {
            context.page.send_keys(element, c.encode_utf8(&mut buffer)).map_err(failed)?;
            context.pacer.pause_between_keys(params.min_delay, params.max_delay);
        }
        context.wait_for_ready()?;

        Ok(ToolResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::tree::DomTree;
    use crate::task::pacing::{Pacer, PacingOptions};
    use std::time::Instant;

    #[test]
    fn test_input_params() {
        let params: InputTextParams = serde_json::from_value(serde_json::json!({"text": "hi"})).unwrap();
        assert_eq!(params.text, "hi");
        assert!(params.min_delay.is_none());

        assert!(serde_json::from_value::<InputTextParams>(serde_json::json!({})).is_err());
    }

    #[test]
    fn test_types_character_by_character() {
        let mut page = DomTree::parse(r#"<input name="q" value="">"#).unwrap();
        let input = page.find_by_xpath("//input[@name='q']").unwrap()[0];
        let mut pacer = Pacer::new(PacingOptions::none());

        let params = InputTextParams { text: "héllo".to_string(), min_delay: Some(0.0), max_delay: Some(0.01) };
        let started = Instant::now();
        let mut context = ToolContext::new(&mut page, &mut pacer).with_element(Some(&input));
        InputTextTool.execute_typed(params, &mut context).unwrap();

        assert!(started.elapsed().as_secs_f64() <= 5.0 * 0.01 + 1.0);
        assert_eq!(page.keys_sent(), vec!["h", "é", "l", "l", "o"]);
        assert_eq!(page.click_count(), 1);
        assert_eq!(page.attribute(&input, "value").unwrap().as_deref(), Some("héllo"));
    }
}
