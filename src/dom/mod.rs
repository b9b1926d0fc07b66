//! Document model and element resolution
//!
//! - [`Target`]: classification of target strings (id, XPath, HTML snippet)
//! - [`resolver`]: maps targets and captured snippets to live elements
//! - [`ElementCache`]: named targets and the elements they resolved to
//! - [`DomTree`]: an in-memory [`crate::Page`] built from HTML, with its own XPath evaluator

pub mod cache;
pub mod element;
pub mod html;
pub mod resolver;
pub mod target;
pub mod tree;
pub mod xpath;

pub use cache::{CacheEntry, ElementCache};
pub use element::{ElementNode, Node};
pub use resolver::{ResolverOptions, SnippetElement, resolve_snippet, resolve_target};
pub use target::{Target, TargetKind};
pub use tree::{ClickEffect, DomTree, PageEvent, TreeElement};
pub use xpath::XPath;
