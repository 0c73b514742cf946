//! Bounded-round retry over a working set.
//!
//! SQL objects often depend on one another (a view selecting from a function,
//! a procedure calling a view) and the files carry no ordering metadata. The
//! loop attempts every outstanding item once per round; items that succeed
//! leave the working set, items that fail stay for the next round. After the
//! round budget is spent, whatever is left is reported with the full history
//! of its failures.

use crate::error::{Result, SqlrigError};
use serde::{Deserialize, Serialize};

/// Prefix of every entry in an item's error history.
pub const ERROR_SEPARATOR: &str = "\n------\n";

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// How many rounds a batch gets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoundBudget {
    /// One round per item: enough to resolve any dependency chain among the
    /// items themselves.
    #[default]
    ItemCount,
    Fixed(usize),
}

impl RoundBudget {
    /// Budget for a configured `max_rounds`. Zero rounds would never run an
    /// item and is rejected.
    pub fn from_override(max_rounds: Option<usize>) -> Result<Self> {
        match max_rounds {
            Some(0) => Err(SqlrigError::InvalidConfig(
                "deploy.max_rounds must be at least 1".to_string(),
            )),
            Some(n) => Ok(RoundBudget::Fixed(n)),
            None => Ok(RoundBudget::ItemCount),
        }
    }

    pub fn rounds(&self, item_count: usize) -> usize {
        match self {
            RoundBudget::ItemCount => item_count,
            RoundBudget::Fixed(n) => *n,
        }
    }
}

/// What to do with an item whose failure no retry can fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermanentErrorPolicy {
    /// Keep retrying until the round budget is spent, like any other failure.
    #[default]
    Retry,
    /// Retire the item after its first failure.
    ShortCircuit,
}

// ---------------------------------------------------------------------------
// Item errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// May succeed in a later round, e.g. a missing dependency.
    Transient(String),
    /// Cannot succeed no matter how often it is retried.
    Permanent(String),
}

impl ItemError {
    pub fn message(&self) -> &str {
        match self {
            ItemError::Transient(m) | ItemError::Permanent(m) => m,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, ItemError::Permanent(_))
    }
}

impl From<SqlrigError> for ItemError {
    fn from(e: SqlrigError) -> Self {
        match e {
            SqlrigError::NamingConvention { .. }
            | SqlrigError::InvalidEncoding { .. }
            | SqlrigError::UnknownObjectType(_) => ItemError::Permanent(e.to_string()),
            other => ItemError::Transient(other.to_string()),
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

// ---------------------------------------------------------------------------
// BatchRunner
// ---------------------------------------------------------------------------

/// Outcome of one attempt at one item.
pub type Attempt = std::result::Result<(), ItemError>;

/// Executes one unit of work.
pub trait BatchRunner<T> {
    fn run(&mut self, item: &T) -> Attempt;
}

impl<T, F> BatchRunner<T> for F
where
    F: FnMut(&T) -> Attempt,
{
    fn run(&mut self, item: &T) -> Attempt {
        self(item)
    }
}

// ---------------------------------------------------------------------------
// RetryLoop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FailedItem<T> {
    pub item: T,
    /// One entry per failed attempt, each prefixed with [`ERROR_SEPARATOR`].
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryLoop {
    budget: RoundBudget,
    policy: PermanentErrorPolicy,
}

impl RetryLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn budget(mut self, budget: RoundBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn policy(mut self, policy: PermanentErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run `runner` over `items` until every item has succeeded or the round
    /// budget is spent. Returns the items that never succeeded, in input
    /// order. An empty result means total success.
    pub fn run<T, R>(&self, items: &[T], runner: &mut R) -> Vec<FailedItem<T>>
    where
        T: Clone,
        R: BatchRunner<T> + ?Sized,
    {
        let max_rounds = self.budget.rounds(items.len());
        let mut histories: Vec<Vec<String>> = vec![Vec::new(); items.len()];
        let mut retired: Vec<usize> = Vec::new();
        let mut outstanding: Vec<usize> = (0..items.len()).collect();

        for round in 1..=max_rounds {
            if outstanding.is_empty() {
                break;
            }
            let mut remaining = Vec::with_capacity(outstanding.len());
            for idx in outstanding {
                if let Err(e) = runner.run(&items[idx]) {
                    histories[idx].push(format!("{ERROR_SEPARATOR}{}", e.message()));
                    if e.is_permanent() && self.policy == PermanentErrorPolicy::ShortCircuit {
                        retired.push(idx);
                    } else {
                        remaining.push(idx);
                    }
                }
            }
            tracing::debug!(
                round,
                max_rounds,
                remaining = remaining.len(),
                "retry round finished"
            );
            outstanding = remaining;
        }

        // Whatever is still outstanding when the budget runs out has failed,
        // attempted or not.
        let mut unfinished = outstanding;
        unfinished.extend(retired);
        unfinished.sort_unstable();
        unfinished
            .into_iter()
            .map(|idx| FailedItem {
                item: items[idx].clone(),
                errors: std::mem::take(&mut histories[idx]),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn all_succeed_in_one_round() {
        let items = vec!["a", "b", "c"];
        let mut calls = 0;
        let failures = RetryLoop::new().run(&items, &mut |_: &&str| -> Attempt {
            calls += 1;
            Ok(())
        });
        assert!(failures.is_empty());
        assert_eq!(calls, 3);
    }

    #[test]
    fn dependency_resolves_in_later_round() {
        // "view" needs "func" which comes after it in the list.
        let items = vec!["view", "func"];
        let mut created: Vec<String> = Vec::new();
        let failures = RetryLoop::new().run(&items, &mut |item: &&str| -> Attempt {
            if *item == "view" && !created.iter().any(|c| c == "func") {
                return Err(ItemError::Transient("invalid object name 'func'".into()));
            }
            created.push(item.to_string());
            Ok(())
        });
        assert!(failures.is_empty());
        assert_eq!(created, vec!["func".to_string(), "view".to_string()]);
    }

    #[test]
    fn always_failing_item_gets_one_entry_per_round() {
        let items = vec![PathBuf::from("a.sql"), PathBuf::from("b.sql")];
        let failures = RetryLoop::new().run(&items, &mut |item: &PathBuf| -> Attempt {
            if item.ends_with("b.sql") {
                Err(ItemError::Transient("syntax error".into()))
            } else {
                Ok(())
            }
        });
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].item, PathBuf::from("b.sql"));
        assert_eq!(
            failures[0].errors,
            vec!["\n------\nsyntax error".to_string(); 2]
        );
    }

    #[test]
    fn fixed_budget_overrides_item_count() {
        let items = vec![1, 2];
        let mut attempts = 0;
        let failures = RetryLoop::new()
            .budget(RoundBudget::Fixed(5))
            .run(&items, &mut |_: &i32| -> Attempt {
                attempts += 1;
                Err(ItemError::Transient("no".into()))
            });
        assert_eq!(attempts, 10);
        assert!(failures.iter().all(|f| f.errors.len() == 5));
    }

    #[test]
    fn succeeded_item_is_not_reported_despite_history() {
        let items = vec!["flaky"];
        let mut tries = 0;
        let failures = RetryLoop::new()
            .budget(RoundBudget::Fixed(3))
            .run(&items, &mut |_: &&str| -> Attempt {
                tries += 1;
                if tries < 2 {
                    Err(ItemError::Transient("deadlock".into()))
                } else {
                    Ok(())
                }
            });
        assert!(failures.is_empty());
        assert_eq!(tries, 2);
    }

    #[test]
    fn permanent_errors_retry_by_default() {
        let items = vec!["bad.name.too.many.sql", "ok.sql", "also.ok.sql"];
        let failures = RetryLoop::new().run(&items, &mut |item: &&str| -> Attempt {
            if item.starts_with("bad") {
                Err(ItemError::Permanent("naming".into()))
            } else {
                Ok(())
            }
        });
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].errors.len(), 3);
    }

    #[test]
    fn short_circuit_retires_permanent_failures() {
        let items = vec!["bad", "transient"];
        let mut attempts: HashMap<String, usize> = HashMap::new();
        let failures = RetryLoop::new()
            .policy(PermanentErrorPolicy::ShortCircuit)
            .run(&items, &mut |item: &&str| -> Attempt {
                *attempts.entry(item.to_string()).or_default() += 1;
                if *item == "bad" {
                    Err(ItemError::Permanent("naming".into()))
                } else {
                    Err(ItemError::Transient("timeout".into()))
                }
            });
        assert_eq!(attempts["bad"], 1);
        assert_eq!(attempts["transient"], 2);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].item, "bad");
        assert_eq!(failures[0].errors.len(), 1);
        assert_eq!(failures[1].errors.len(), 2);
    }

    #[test]
    fn failures_keep_input_order() {
        let items = vec!["c", "a", "b"];
        let failures = RetryLoop::new().run(&items, &mut |_: &&str| -> Attempt {
            Err(ItemError::Transient("x".into()))
        });
        let order: Vec<&str> = failures.iter().map(|f| f.item).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn empty_input_is_success() {
        let items: Vec<String> = Vec::new();
        let failures = RetryLoop::new().run(&items, &mut |_: &String| -> Attempt {
            Err(ItemError::Transient("unreachable".into()))
        });
        assert!(failures.is_empty());
    }

    #[test]
    fn exhausted_budget_reports_unattempted_items() {
        let items = vec!["a.sql", "b.sql"];
        let mut attempts = 0;
        let failures = RetryLoop::new()
            .budget(RoundBudget::Fixed(0))
            .run(&items, &mut |_: &&str| -> Attempt {
                attempts += 1;
                Ok(())
            });
        assert_eq!(attempts, 0);
        let order: Vec<&str> = failures.iter().map(|f| f.item).collect();
        assert_eq!(order, vec!["a.sql", "b.sql"]);
        assert!(failures.iter().all(|f| f.errors.is_empty()));
    }

    #[test]
    fn zero_round_override_is_rejected() {
        assert!(matches!(
            RoundBudget::from_override(Some(0)),
            Err(SqlrigError::InvalidConfig(_))
        ));
        assert_eq!(RoundBudget::from_override(Some(2)).unwrap(), RoundBudget::Fixed(2));
        assert_eq!(RoundBudget::from_override(None).unwrap(), RoundBudget::ItemCount);
    }

    #[test]
    fn naming_convention_converts_to_permanent() {
        let e: ItemError = SqlrigError::NamingConvention {
            file: PathBuf::from("x.sql"),
            expected: "schema.object.sql",
        }
        .into();
        assert!(e.is_permanent());
        let e: ItemError = SqlrigError::Sql("timeout".into()).into();
        assert!(!e.is_permanent());
        assert_eq!(e.message(), "sql error: timeout");
    }
}
