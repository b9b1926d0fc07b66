//! Declarative tasks: loading task books, gating and repeating actions, running and recording them

pub mod condition;
pub mod config;
pub mod pacing;
pub mod record;
pub mod repeat;
pub mod runtime;

pub use condition::{ConditionEvaluator, EvaluationMode};
pub use config::{ActionDefinition, Clause, Condition, Conditions, OneOrMany, TaskBook, TaskDefinition};
pub use pacing::{DelayRange, Pacer, PacingOptions};
pub use record::{ActionRecord, ActionRecorder, SnapshotKey};
pub use repeat::{Gate, RepeatController, RepeatState};
pub use runtime::{RuntimeOptions, TaskReport, TaskRuntime};
