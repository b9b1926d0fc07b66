use crate::error::Result;

/// Which predicate the controller wants evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Checked once, before the first iteration
    Init,
    /// Checked after each iteration when no fixed count is set
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatState {
    NotStarted,
    Running(usize),
    Done,
}

/// Loop driver with an entry gate and a continuation rule
///
/// A positive `count` runs exactly that many iterations. A zero count with a repeat predicate runs
/// while the predicate holds after each iteration. Anything else runs once. The predicates are
/// evaluated by the caller through the closure handed to [`RepeatController::next`], so the loop
/// body is free to borrow whatever the predicates need.
///
/// ```
/// use browser_tasks::task::RepeatController;
///
/// let mut repeat = RepeatController::new(3, false, false);
/// let mut seen = Vec::new();
/// while let Some(index) = repeat.next(|_| Ok(true)).unwrap() {
///     seen.push(index);
/// }
/// assert_eq!(seen, vec![0, 1, 2]);
/// ```
#[derive(Debug, Clone)]
pub struct RepeatController {
    count: usize,
    has_init: bool,
    has_predicate: bool,
    state: RepeatState,
}

impl RepeatController {
    pub fn new(count: usize, has_init: bool, has_predicate: bool) -> Self {
        Self { count, has_init, has_predicate, state: RepeatState::NotStarted }
    }

    pub fn state(&self) -> RepeatState {
        self.state
    }

    /// Index of the next iteration, or `None` once the loop is over
    pub fn next<F>(&mut self, check: F) -> Result<Option<usize>>
    where
        F: FnOnce(Gate) -> Result<bool>,
    {
        self.state = match self.state {
            RepeatState::NotStarted => {
                if self.has_init && !check(Gate::Init)? {
                    RepeatState::Done
                } else {
                    RepeatState::Running(0)
                }
            }
            RepeatState::Running(index) => {
                let more = if self.count > 0 {
                    index + 1 < self.count
                } else if self.has_predicate {
                    check(Gate::Repeat)?
                } else {
                    false
                };
                if more { RepeatState::Running(index + 1) } else { RepeatState::Done }
            }
            RepeatState::Done => RepeatState::Done,
        };

        Ok(match self.state {
            RepeatState::Running(index) => Some(index),
            _ => None,
        })
    }
}
