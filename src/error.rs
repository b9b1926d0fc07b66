use thiserror::Error;

/// Errors raised while driving a page or running a task
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// The page did not finish loading in time. Callers may stop the load and carry on.
    #[error("Navigation to {url} timed out")]
    NavigationTimeout { url: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("JavaScript evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Failed to parse HTML: {0}")]
    HtmlParse(String),

    #[error("Failed to capture screenshot: {0}")]
    ScreenshotFailed(String),

    #[error("Tool '{tool}' failed: {reason}")]
    ToolExecutionFailed { tool: String, reason: String },

    #[error("Invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid task configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BrowserError {
    /// Whether this error is a page-load timeout that can be recovered from locally
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserError::NavigationTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, BrowserError>;
