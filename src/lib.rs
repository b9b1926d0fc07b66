//! # browser-tasks
//!
//! Replays declarative browser tasks against a live page. A task book names the elements a task
//! works with and lists its actions; each action may be gated and repeated by conditions over the
//! existence and state of elements.
//!
//! ## Features
//!
//! - **Target resolution**: elements are addressed by `id:`, `xpath:` or a captured HTML snippet
//!   (`html:<button class="primary">Buy</button>`), which is matched back to a live element by
//!   progressively narrowing on tag, text and attributes
//! - **Element cache**: named targets resolve once per document and are looked up again after
//!   navigation
//! - **Conditions**: `exists`, `not_exists`, `displayed`, `enabled`, `selected` and their `not_`
//!   forms, combined as any-of-all
//! - **Actions**: `click`, `input_text`, `open_url`, `get_text`, `get_html`, `scroll`
//! - **Recording**: per-action HTML and screenshot snapshots plus a JSON-lines action log
//!
//! ## Running a task
//!
//! ```rust,no_run
//! use browser_tasks::{BrowserSession, LaunchOptions, RuntimeOptions, TaskBook, TaskRuntime};
//!
//! # fn main() -> browser_tasks::Result<()> {
//! let book = TaskBook::from_file("tasks.json")?;
//! let mut session = BrowserSession::launch(LaunchOptions::default())?;
//! let mut runtime = TaskRuntime::new(book, RuntimeOptions::new().record_dir("records"))?;
//!
//! if let Some(report) = runtime.execute_task(&mut session, "search")? {
//!     println!("{} actions executed", report.records.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Offline pages
//!
//! [`DomTree`] implements the same [`Page`] capability on an in-memory document, which is handy
//! for trying out task books and for tests:
//!
//! ```rust
//! use browser_tasks::{DomTree, Page};
//! use browser_tasks::dom::{ElementCache, ResolverOptions};
//!
//! # fn main() -> browser_tasks::Result<()> {
//! let page = DomTree::parse(r#"<button id="a">Save</button><button id="b">Save</button>"#)?;
//! let mut cache = ElementCache::from_targets([("save", r#"<button id="b">Save</button>"#)]);
//!
//! let save = cache.find_element(&page, &ResolverOptions::default(), "save")?.unwrap();
//! assert_eq!(page.attribute(&save, "id")?.as_deref(), Some("b"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`browser`]: the [`Page`] capability and the Chrome-backed [`BrowserSession`]
//! - [`dom`]: target classification, snippet resolution, the element cache and [`DomTree`]
//! - [`task`]: task books, conditions, repetition, pacing, recording and the runtime
//! - [`tools`]: the actions a task can run
//! - [`error`]: error types and result aliases

pub mod browser;
pub mod dom;
pub mod error;
pub mod task;
pub mod tools;

pub use browser::{BrowserSession, ConnectionOptions, ElementState, LaunchOptions, Page};
pub use dom::{DomTree, ElementCache, ResolverOptions, Target, TargetKind};
pub use error::{BrowserError, Result};
pub use task::{ActionDefinition, ActionRecord, Conditions, PacingOptions, RuntimeOptions, TaskBook, TaskReport, TaskRuntime};
pub use tools::{Tool, ToolContext, ToolRegistry, ToolResult};
