//! Live pages that tasks run against
//!
//! - [`Page`]: the capability the resolver, condition evaluator and tools are written against
//! - [`BrowserSession`]: a Chrome/Chromium tab driven through the DevTools protocol
//! - [`LaunchOptions`] / [`ConnectionOptions`]: how the browser is obtained

pub mod config;
pub mod page;
pub mod session;

pub use config::{ConnectionOptions, LaunchOptions};
pub use page::{ElementState, Page};
pub use session::{BrowserSession, ChromeElement};
