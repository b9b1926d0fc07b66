//! Runs tasks from a [`TaskBook`] against a [`Page`]

use crate::browser::page::Page;
use crate::dom::cache::ElementCache;
use crate::dom::resolver::ResolverOptions;
use crate::error::{BrowserError, Result};
use crate::task::condition::{self, EvaluationMode};
use crate::task::config::{ActionDefinition, Conditions, TaskBook, TaskDefinition};
use crate::task::pacing::{Pacer, PacingOptions};
use crate::task::record::{ActionRecord, ActionRecorder, SnapshotKey};
use crate::task::repeat::{Gate, RepeatController};
use crate::tools::{ToolContext, ToolRegistry};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name reported for sequences run through [`TaskRuntime::execute_actions`]
pub const AD_HOC_TASK: &str = "<actions>";

fn default_load_timeout_ms() -> u64 {
    20_000
}

/// How a [`TaskRuntime`] resolves, paces and records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    pub resolver: ResolverOptions,

    pub pacing: PacingOptions,

    /// How long an action waits for the document to report ready, in milliseconds
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Write snapshots and the action log below this directory
    pub record_dir: Option<PathBuf>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            resolver: ResolverOptions::default(),
            pacing: PacingOptions::default(),
            load_timeout_ms: default_load_timeout_ms(),
            record_dir: None,
        }
    }
}

impl RuntimeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolver(mut self, resolver: ResolverOptions) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn pacing(mut self, pacing: PacingOptions) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn record_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.record_dir = Some(dir.into());
        self
    }

    pub fn load_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

/// What one task execution did
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub task: String,

    /// Passes over the action list
    pub iterations: usize,

    pub records: Vec<ActionRecord>,

    /// The action log, when recording
    pub log_path: Option<PathBuf>,
}

impl TaskReport {
    /// Results of every action that returned something, in execution order
    pub fn results(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.records.iter().filter_map(|record| record.action_result.as_ref())
    }
}

/// Executes named tasks, keeping resolved elements cached between actions and tasks
///
/// ```rust
/// use browser_tasks::{DomTree, RuntimeOptions, TaskBook, TaskRuntime};
/// use browser_tasks::task::PacingOptions;
///
/// # fn main() -> browser_tasks::Result<()> {
/// let book = TaskBook::from_json(r#"{
///     "elements": {"title": "<h1>Welcome</h1>"},
///     "tasks": {"read": {"actions": [{"name": "get_text", "target": "title"}]}}
/// }"#)?;
/// let mut page = DomTree::parse("<h1>Welcome back</h1>")?;
/// let mut runtime = TaskRuntime::new(book, RuntimeOptions::new().pacing(PacingOptions::none()))?;
///
/// let report = runtime.execute_task(&mut page, "read")?.expect("task exists");
/// assert_eq!(report.results().next(), Some(&serde_json::json!("Welcome back")));
/// # Ok(())
/// # }
/// ```
pub struct TaskRuntime<P: Page> {
    book: TaskBook,
    cache: ElementCache<P::Element>,
    registry: ToolRegistry<P>,
    pacer: Pacer,
    options: RuntimeOptions,
}

impl<P: Page> TaskRuntime<P> {
    /// Runtime with the built-in actions. Fails if the book uses unknown actions or bad arguments.
    pub fn new(book: TaskBook, options: RuntimeOptions) -> Result<Self> {
        Self::with_registry(book, options, ToolRegistry::with_defaults())
    }

    pub fn with_registry(book: TaskBook, options: RuntimeOptions, registry: ToolRegistry<P>) -> Result<Self> {
        book.validate(&registry)?;
        let cache = ElementCache::from_targets(book.elements.clone());
        let pacer = Pacer::new(options.pacing.clone());
        Ok(Self { book, cache, registry, pacer, options })
    }

    pub fn book(&self) -> &TaskBook {
        &self.book
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn cache(&self) -> &ElementCache<P::Element> {
        &self.cache
    }

    pub fn registry(&self) -> &ToolRegistry<P> {
        &self.registry
    }

    /// Target string bound to an element name
    pub fn element(&self, name: &str) -> Option<&str> {
        self.cache.get(name).map(|entry| entry.target())
    }

    /// Bind `name` to `target`, replacing any earlier binding and its resolved elements
    pub fn set_element(&mut self, name: impl Into<String>, target: impl Into<String>) {
        self.cache.set(name, target);
    }

    pub fn contains_element(&self, name: &str) -> bool {
        self.cache.contains(name)
    }

    /// Run the task called `name`. Returns `None` when the book has no such task.
    pub fn execute_task(&mut self, page: &mut P, name: &str) -> Result<Option<TaskReport>> {
        let Some(task) = self.book.task(name).cloned() else {
            warn!("No task named '{}'", name);
            return Ok(None);
        };
        let recorder = self.options.record_dir.as_deref().map(|dir| ActionRecorder::new(task_record_dir(dir, name)));
        self.run(page, name, &task, recorder).map(Some)
    }

    /// Run an ad-hoc action sequence once, recording straight into the record directory
    pub fn execute_actions(&mut self, page: &mut P, actions: &[ActionDefinition]) -> Result<TaskReport> {
        for (index, action) in actions.iter().enumerate() {
            action.validate(&self.registry).map_err(|e| match e {
                BrowserError::InvalidConfig(reason) => BrowserError::InvalidConfig(format!("action {}: {}", index, reason)),
                other => other,
            })?;
        }
        let task = TaskDefinition { actions: actions.to_vec(), init_cond: None, repeat: 0, repeat_when: None };
        let recorder = self.options.record_dir.as_deref().map(ActionRecorder::new);
        self.run(page, AD_HOC_TASK, &task, recorder)
    }

    fn run(
        &mut self,
        page: &mut P,
        name: &str,
        task: &TaskDefinition,
        recorder: Option<ActionRecorder>,
    ) -> Result<TaskReport> {
        info!("Running task '{}' ({} actions)", name, task.actions.len());
        let mut records = Vec::new();
        let mut iterations = 0;

        let mut repeat = RepeatController::new(task.repeat, task.init_cond.is_some(), task.repeat_when.is_some());
        while let Some(iteration) = repeat.next(|gate| {
            let conditions = gate_conditions(gate, task.init_cond.as_ref(), task.repeat_when.as_ref());
            condition::evaluate(&*page, &mut self.cache, &self.options.resolver, conditions, EvaluationMode::Multi)
        })? {
            iterations += 1;
            debug!("Task '{}' iteration {}", name, iteration);
            for (action_index, action) in task.actions.iter().enumerate() {
                let position = ActionPosition { iteration, action: action_index };
                self.run_action(page, action, position, recorder.as_ref(), &mut records)?;
            }
        }

        if iterations == 0 {
            info!("Task '{}' skipped, its init condition does not hold", name);
        }

        let log_path = match &recorder {
            Some(recorder) => Some(recorder.write_records(&records)?),
            None => None,
        };
        info!("Task '{}' finished: {} iterations, {} actions", name, iterations, records.len());

        Ok(TaskReport { task: name.to_string(), iterations, records, log_path })
    }

    fn run_action(
        &mut self,
        page: &mut P,
        action: &ActionDefinition,
        position: ActionPosition,
        recorder: Option<&ActionRecorder>,
        records: &mut Vec<ActionRecord>,
    ) -> Result<()> {
        let tool = self.registry.get(&action.name).ok_or_else(|| BrowserError::UnknownTool(action.name.clone()))?;
        let load_timeout = self.options.load_timeout_duration();

        let mut repeat =
            RepeatController::new(action.repeat_count(), action.init_cond.is_some(), action.repeat_cond.is_some());
        while let Some(repeat_index) = repeat.next(|gate| {
            let conditions = gate_conditions(gate, action.init_cond.as_ref(), action.repeat_cond.as_ref());
            condition::evaluate(&*page, &mut self.cache, &self.options.resolver, conditions, EvaluationMode::Single)
        })? {
            for (target_index, target) in action.targets().into_iter().enumerate() {
                let element = match target {
                    Some(target) => self.cache.find_element(&*page, &self.options.resolver, target)?,
                    None => None,
                };

                let mut record = ActionRecord {
                    task_repeat_index: position.iteration,
                    action_index: position.action,
                    action_repeat_index: repeat_index,
                    action_target_index: target.map(|_| target_index),
                    action_target: target.map(str::to_string),
                    action_target_element: None,
                    action_result: None,
                };

                if let Some(recorder) = recorder {
                    let key = SnapshotKey {
                        iteration: position.iteration,
                        action: position.action,
                        target: target_index,
                        repeat: repeat_index,
                    };
                    snapshot(page, recorder, key, element.as_ref(), action.screenshot)?;
                }

                if tool.requires_element() && element.is_none() {
                    warn!(
                        "Skipping '{}': target '{}' did not resolve to an element",
                        action.name,
                        target.unwrap_or_default()
                    );
                    records.push(record);
                    continue;
                }

                if let Some(element) = &element {
                    match page.outer_html(element) {
                        Ok(html) => record.action_target_element = Some(html),
                        Err(BrowserError::ElementNotFound(reason)) => {
                            warn!("Skipping '{}': target element went away ({})", action.name, reason);
                            records.push(record);
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }

                debug!("Executing '{}' on target {:?} (repeat {})", action.name, target, repeat_index);
                let mut context = ToolContext::new(&mut *page, &mut self.pacer)
                    .with_element(element.as_ref())
                    .with_load_timeout(load_timeout);
                let result = tool.execute(action.args.as_ref(), &mut context)?;
                if !result.success {
                    warn!("'{}' reported failure: {}", action.name, result.error.as_deref().unwrap_or("unknown error"));
                }
                record.action_result = result.data;
                records.push(record);

                self.pacer.pause_between_actions();
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct ActionPosition {
    iteration: usize,
    action: usize,
}

fn gate_conditions<'a>(
    gate: Gate,
    init: Option<&'a Conditions>,
    repeat: Option<&'a Conditions>,
) -> Option<&'a Conditions> {
    match gate {
        Gate::Init => init,
        Gate::Repeat => repeat,
    }
}

/// Body HTML and, when asked for, a screenshot centered on the target
fn snapshot<P: Page>(
    page: &mut P,
    recorder: &ActionRecorder,
    key: SnapshotKey,
    element: Option<&P::Element>,
    screenshot: bool,
) -> Result<()> {
    let html = page.body_html()?;
    recorder.write_html(key, &html)?;
    if screenshot {
        let png = page.screenshot(element)?;
        recorder.write_screenshot(key, &png)?;
    }
    Ok(())
}

/// Directory a task's recordings go to below `record_dir`
pub fn task_record_dir(record_dir: &Path, task: &str) -> PathBuf {
    record_dir.join(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::tree::DomTree;
    use serde_json::json;

    fn options() -> RuntimeOptions {
        RuntimeOptions::new().pacing(PacingOptions::none())
    }

    fn runtime(book: serde_json::Value) -> TaskRuntime<DomTree> {
        let book: TaskBook = serde_json::from_value(book).unwrap();
        TaskRuntime::new(book, options()).unwrap()
    }

    #[test]
    fn test_runtime_options_from_json() {
        let options: RuntimeOptions = serde_json::from_value(json!({"record_dir": "/tmp/out"})).unwrap();
        assert_eq!(options.load_timeout_duration(), Duration::from_secs(20));
        assert_eq!(options.record_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(options.resolver, ResolverOptions::default());
    }

    #[test]
    fn test_element_accessors() {
        let mut runtime = runtime(json!({"elements": {"go": "id:go"}, "tasks": {}}));
        assert_eq!(runtime.element("go"), Some("id:go"));
        assert!(!runtime.contains_element("stop"));

        runtime.set_element("stop", "xpath://button[@id='stop']");
        assert!(runtime.contains_element("stop"));
        assert_eq!(runtime.element("stop"), Some("xpath://button[@id='stop']"));
    }

    #[test]
    fn test_invalid_book_is_rejected() {
        let book = TaskBook::from_json(r#"{"tasks": {"t": {"actions": [{"name": "teleport"}]}}}"#).unwrap();
        assert!(matches!(TaskRuntime::<DomTree>::new(book, options()), Err(BrowserError::InvalidConfig(_))));
    }

    #[test]
    fn test_action_repeats_while_condition_holds() {
        let mut page = DomTree::parse(r#"<a id="next" href="/2">Next</a>"#)
            .unwrap()
            .with_route("/2", r#"<a id="next" href="/3">Next</a>"#)
            .with_route("/3", "<p>Last page</p>");
        let mut runtime = runtime(json!({
            "elements": {"next": "id:next"},
            "tasks": {"paginate": {"actions": [
                {"name": "click", "target": "next", "repeat_cond": {"exists": "next"}}
            ]}}
        }));

        let report = runtime.execute_task(&mut page, "paginate").unwrap().unwrap();
        assert_eq!(
            report.records.iter().map(|r| r.action_repeat_index).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(page.url(), "/3");
        assert_eq!(page.click_count(), 2);
    }

    #[test]
    fn test_unresolved_target_is_skipped() {
        let mut page = DomTree::parse("<p>nothing here</p>").unwrap();
        let mut runtime = runtime(json!({
            "tasks": {"t": {"actions": [{"name": "click", "target": "id:missing"}]}}
        }));

        let report = runtime.execute_task(&mut page, "t").unwrap().unwrap();
        assert_eq!(page.click_count(), 0);
        assert_eq!(report.records.len(), 1);
        assert!(report.records[0].action_target_element.is_none());
        assert!(report.records[0].action_result.is_none());
    }

    #[test]
    fn test_gate_conditions() {
        let init: Conditions = serde_json::from_value(json!({"exists": "a"})).unwrap();
        assert_eq!(gate_conditions(Gate::Init, Some(&init), None), Some(&init));
        assert_eq!(gate_conditions(Gate::Repeat, Some(&init), None), None);
    }
}
