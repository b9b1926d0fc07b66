//! Boolean gates over element existence and state
//!
//! A [`Conditions`] value holds when any of its conditions holds; a condition holds when every
//! clause does. A missing gate always passes, an empty list never does.

use crate::browser::page::{ElementState, Page};
use crate::dom::cache::ElementCache;
use crate::dom::resolver::ResolverOptions;
use crate::error::Result;
use crate::task::config::{Clause, Condition, Conditions};
use log::debug;

/// How many elements of each target a clause looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// Only the first resolved element (action gates)
    Single,
    /// Every resolved element (task gates)
    Multi,
}

/// Evaluates conditions against a page through a shared element cache
pub struct ConditionEvaluator<'a, P: Page> {
    page: &'a P,
    cache: &'a mut ElementCache<P::Element>,
    options: &'a ResolverOptions,
    mode: EvaluationMode,
}

impl<'a, P: Page> ConditionEvaluator<'a, P> {
    pub fn new(
        page: &'a P,
        cache: &'a mut ElementCache<P::Element>,
        options: &'a ResolverOptions,
        mode: EvaluationMode,
    ) -> Self {
        Self { page, cache, options, mode }
    }

    /// `None` passes; otherwise true iff at least one condition holds
    pub fn evaluate(&mut self, conditions: Option<&Conditions>) -> Result<bool> {
        let Some(conditions) = conditions else {
            return Ok(true);
        };
        for condition in conditions.as_slice() {
            if self.check(condition)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True iff every clause of `condition` holds
    pub fn check(&mut self, condition: &Condition) -> Result<bool> {
        for clause in &condition.clauses {
            if !self.check_clause(clause)? {
                debug!("Condition clause {:?} does not hold", clause);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn check_clause(&mut self, clause: &Clause) -> Result<bool> {
        match clause {
            Clause::Exists(targets) => {
                for target in targets {
                    if self.lookup(target)?.is_empty() {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Clause::NotExists(targets) => {
                for target in targets {
                    if !self.lookup(target)?.is_empty() {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Clause::State { state, negated, targets } => {
                for target in targets {
                    for element in self.lookup(target)? {
                        if !state_holds(self.page, &element, *state, *negated)? {
                            return Ok(false);
                        }
                    }
                }
                Ok(true)
            }
        }
    }

    fn lookup(&mut self, target: &str) -> Result<Vec<P::Element>> {
        match self.mode {
            EvaluationMode::Single => {
                Ok(self.cache.find_element(self.page, self.options, target)?.into_iter().collect())
            }
            EvaluationMode::Multi => self.cache.find_elements(self.page, self.options, target),
        }
    }
}

/// Evaluate `conditions` once, without keeping an evaluator around
pub fn evaluate<P: Page>(
    page: &P,
    cache: &mut ElementCache<P::Element>,
    options: &ResolverOptions,
    conditions: Option<&Conditions>,
    mode: EvaluationMode,
) -> Result<bool> {
    ConditionEvaluator::new(page, cache, options, mode).evaluate(conditions)
}

/// Whether `state` holds for `element`, negated when requested
pub fn state_holds<P: Page>(page: &P, element: &P::Element, state: ElementState, negated: bool) -> Result<bool> {
    Ok(page.state(element, state)? != negated)
}
