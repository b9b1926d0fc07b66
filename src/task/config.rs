//! Task book: named element targets plus named action sequences, loaded from JSON

use crate::browser::page::{ElementState, Page};
use crate::error::{BrowserError, Result};
use crate::tools::ToolRegistry;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;

/// A single target or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn as_slice(&self) -> &[String] {
        match self {
            OneOrMany::One(target) => std::slice::from_ref(target),
            OneOrMany::Many(targets) => targets,
        }
    }
}

/// One predicate of a [`Condition`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// Every target resolves to at least one element
    Exists(Vec<String>),
    /// No target resolves to anything
    NotExists(Vec<String>),
    /// Resolved elements are (or, `negated`, are not) in `state`
    State { state: ElementState, negated: bool, targets: Vec<String> },
}

impl Clause {
    fn parse(key: &str, targets: OneOrMany) -> std::result::Result<Self, String> {
        let targets = targets.as_slice().to_vec();
        match key {
            "exists" => return Ok(Clause::Exists(targets)),
            "not_exists" => return Ok(Clause::NotExists(targets)),
            _ => {}
        }

        let (name, negated) = match key.strip_prefix("not_") {
            Some(name) => (name, true),
            None => (key, false),
        };
        let state = name.parse::<ElementState>().map_err(|_| format!("unknown condition '{}'", key))?;
        Ok(Clause::State { state, negated, targets })
    }

    fn key(&self) -> String {
        match self {
            Clause::Exists(_) => "exists".to_string(),
            Clause::NotExists(_) => "not_exists".to_string(),
            Clause::State { state, negated: true, .. } => format!("not_{}", state),
            Clause::State { state, negated: false, .. } => state.to_string(),
        }
    }

    pub fn targets(&self) -> &[String] {
        match self {
            Clause::Exists(targets) | Clause::NotExists(targets) | Clause::State { targets, .. } => targets,
        }
    }
}

/// Clauses that must all hold, e.g. `{"exists": "next-page", "not_displayed": "spinner"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IndexMap<String, OneOrMany>", into = "IndexMap<String, OneOrMany>")]
pub struct Condition {
    pub clauses: Vec<Clause>,
}

impl TryFrom<IndexMap<String, OneOrMany>> for Condition {
    type Error = String;

    fn try_from(map: IndexMap<String, OneOrMany>) -> std::result::Result<Self, Self::Error> {
        let clauses = map
            .into_iter()
            .map(|(key, targets)| Clause::parse(&key, targets))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { clauses })
    }
}

impl From<Condition> for IndexMap<String, OneOrMany> {
    fn from(condition: Condition) -> Self {
        condition
            .clauses
            .into_iter()
            .map(|clause| {
                let key = clause.key();
                let mut targets = clause.targets().to_vec();
                let value = if targets.len() == 1 {
                    OneOrMany::One(targets.remove(0))
                } else {
                    OneOrMany::Many(targets)
                };
                (key, value)
            })
            .collect()
    }
}

impl JsonSchema for Condition {
    fn schema_name() -> Cow<'static, str> {
        "Condition".into()
    }

    fn json_schema(generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        <IndexMap<String, OneOrMany>>::json_schema(generator)
    }
}

/// A single condition, or a list where any one holding is enough
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Conditions {
    Any(Vec<Condition>),
    Single(Condition),
}

impl Conditions {
    pub fn as_slice(&self) -> &[Condition] {
        match self {
            Conditions::Any(conditions) => conditions,
            Conditions::Single(condition) => std::slice::from_ref(condition),
        }
    }
}

fn default_screenshot() -> bool {
    true
}

/// One step of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionDefinition {
    /// Action to run: click, input_text, open_url, get_text, get_html or scroll
    pub name: String,

    /// Element name or target string; a list runs the action once per target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<OneOrMany>,

    /// Action-specific arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,

    /// Skip the action entirely unless this holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_cond: Option<Conditions>,

    /// Keep repeating the action while this holds (only used when `repeat` is 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_cond: Option<Conditions>,

    /// Fixed number of runs; defaults to 1, or 0 when `repeat_cond` is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<usize>,

    /// Capture a screenshot with the pre-action snapshot
    #[serde(default = "default_screenshot")]
    pub screenshot: bool,
}

impl ActionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            args: None,
            init_cond: None,
            repeat_cond: None,
            repeat: None,
            screenshot: true,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(OneOrMany::One(target.into()));
        self
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = Some(args);
        self
    }

    pub fn repeat_count(&self) -> usize {
        self.repeat.unwrap_or(if self.repeat_cond.is_some() { 0 } else { 1 })
    }

    /// Check the action name, its arguments and that it has a target when it needs one
    pub fn validate<P: Page>(&self, registry: &ToolRegistry<P>) -> Result<()> {
        let tool = registry
            .get(&self.name)
            .ok_or_else(|| BrowserError::InvalidConfig(format!("unknown action '{}'", self.name)))?;
        tool.validate(self.args.as_ref())?;
        if tool.requires_element() && self.target.is_none() {
            return Err(BrowserError::InvalidConfig(format!("'{}' needs a target", self.name)));
        }
        Ok(())
    }

    /// Targets in order; a target-less action yields a single `None`
    pub fn targets(&self) -> Vec<Option<&str>> {
        match &self.target {
            Some(targets) => targets.as_slice().iter().map(|t| Some(t.as_str())).collect(),
            None => vec![None],
        }
    }
}

/// A named sequence of actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskDefinition {
    pub actions: Vec<ActionDefinition>,

    /// Skip the task unless this holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_cond: Option<Conditions>,

    /// Number of passes over the actions; 0 defers to `repeat_when` (or a single pass)
    #[serde(default)]
    pub repeat: usize,

    /// Run another pass while this holds (only used when `repeat` is 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_when: Option<Conditions>,
}

/// Named element targets and tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskBook {
    /// Element name -> target string (`id:`, `xpath:`, `html:` or auto-detected)
    #[serde(default)]
    pub elements: IndexMap<String, String>,

    #[serde(default)]
    pub tasks: IndexMap<String, TaskDefinition>,
}

impl TaskBook {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BrowserError::InvalidConfig(format!("Invalid task book: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
            .map_err(|e| BrowserError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    pub fn task(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// Check every action name and argument object against `registry`
    pub fn validate<P: Page>(&self, registry: &ToolRegistry<P>) -> Result<()> {
        for (task_name, task) in &self.tasks {
            for (index, action) in task.actions.iter().enumerate() {
                action.validate(registry).map_err(|e| match e {
                    BrowserError::InvalidConfig(reason) => {
                        BrowserError::InvalidConfig(format!("task '{}' action {}: {}", task_name, index, reason))
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    /// JSON Schema of the task book format
    pub fn json_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(TaskBook)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::tree::DomTree;
    use serde_json::json;

    #[test]
    fn test_condition_keys() {
        let condition: Condition = serde_json::from_value(json!({
            "exists": "next",
            "not_exists": ["spinner", "overlay"],
            "displayed": "results",
            "not_enabled": "submit"
        }))
        .unwrap();

        assert_eq!(
            condition.clauses,
            vec![
                Clause::Exists(vec!["next".into()]),
                Clause::NotExists(vec!["spinner".into(), "overlay".into()]),
                Clause::State { state: ElementState::Displayed, negated: false, targets: vec!["results".into()] },
                Clause::State { state: ElementState::Enabled, negated: true, targets: vec!["submit".into()] },
            ]
        );
    }

    #[test]
    fn test_unknown_condition_is_rejected() {
        let err = serde_json::from_value::<Condition>(json!({"clickable": "x"})).unwrap_err();
        assert!(err.to_string().contains("unknown condition 'clickable'"));

        assert!(serde_json::from_value::<Condition>(json!({"not_focused": "x"})).is_err());
    }

    #[test]
    fn test_conditions_single_or_list() {
        let single: Conditions = serde_json::from_value(json!({"exists": "a"})).unwrap();
        assert_eq!(single.as_slice().len(), 1);

        let any: Conditions = serde_json::from_value(json!([{"exists": "a"}, {"exists": "b"}])).unwrap();
        assert_eq!(any.as_slice().len(), 2);

        let empty: Conditions = serde_json::from_value(json!([])).unwrap();
        assert!(empty.as_slice().is_empty());
    }

    #[test]
    fn test_condition_serializes_back() {
        let value = json!({"exists": "a", "not_selected": ["b", "c"]});
        let condition: Condition = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(serde_json::to_value(&condition).unwrap(), value);
    }

    #[test]
    fn test_action_defaults() {
        let action: ActionDefinition = serde_json::from_value(json!({"name": "click", "target": "go"})).unwrap();
        assert_eq!(action.repeat_count(), 1);
        assert!(action.screenshot);
        assert_eq!(action.targets(), vec![Some("go")]);

        let action: ActionDefinition = serde_json::from_value(json!({
            "name": "click",
            "target": ["a", "b"],
            "repeat_cond": {"exists": "more"},
            "screenshot": false
        }))
        .unwrap();
        assert_eq!(action.repeat_count(), 0);
        assert!(!action.screenshot);
        assert_eq!(action.targets(), vec![Some("a"), Some("b")]);

        let action = ActionDefinition::new("open_url");
        assert_eq!(action.targets(), vec![None]);
    }

    #[test]
    fn test_task_book_parse_and_validate() {
        let book = TaskBook::from_json(
            r#"{
                "elements": {"search_box": "xpath://input[@name='q']"},
                "tasks": {
                    "search": {
                        "actions": [
                            {"name": "open_url", "args": {"url": "https://example.com"}},
                            {"name": "input_text", "target": "search_box", "args": {"text": "rust"}}
                        ]
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(book.task_names().collect::<Vec<_>>(), vec!["search"]);
        assert_eq!(book.task("search").unwrap().repeat, 0);
        assert!(book.validate(&ToolRegistry::<DomTree>::with_defaults()).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_actions() {
        let registry = ToolRegistry::<DomTree>::with_defaults();

        let book = TaskBook::from_json(r#"{"tasks": {"t": {"actions": [{"name": "hover", "target": "x"}]}}}"#).unwrap();
        assert!(matches!(book.validate(&registry), Err(BrowserError::InvalidConfig(_))));

        let book =
            TaskBook::from_json(r#"{"tasks": {"t": {"actions": [{"name": "input_text", "target": "x", "args": {"text": 5}}]}}}"#)
                .unwrap();
        assert!(matches!(book.validate(&registry), Err(BrowserError::InvalidArguments { .. })));

        let book = TaskBook::from_json(r#"{"tasks": {"t": {"actions": [{"name": "click"}]}}}"#).unwrap();
        assert!(matches!(book.validate(&registry), Err(BrowserError::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_book_fails_fast() {
        let err = TaskBook::from_json(r#"{"tasks": {"t": {"actions": [], "init_cond": {"hovered": "x"}}}}"#).unwrap_err();
        assert!(matches!(err, BrowserError::InvalidConfig(_)));
    }

    #[test]
    fn test_json_schema_mentions_tasks() {
        let schema = TaskBook::json_schema();
        assert!(schema.to_string().contains("tasks"));
    }
}
