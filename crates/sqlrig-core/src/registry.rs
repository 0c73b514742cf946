//! Action registration and lookup.
//!
//! Registration happens on a [`RegistryBuilder`]; [`RegistryBuilder::build`]
//! freezes it into a [`Registry`] that executors borrow. Nothing can be
//! registered once a run has started.

use crate::action::{Action, ActionFn};
use crate::config::ALLOW_ALL;
use crate::context::Context;
use crate::error::{Result, SqlrigError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Shown by [`Registry::list_all`] for actions registered without one.
pub const NO_DESCRIPTION: &str = "No description available.";

// ---------------------------------------------------------------------------
// RegistryBuilder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    actions: BTreeMap<String, Action>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. A previous action of the same name is replaced.
    pub fn register(&mut self, action: Action) -> &mut Self {
        if self.actions.contains_key(action.name()) {
            tracing::warn!(action = %action.name(), "replacing registered action");
        }
        self.actions.insert(action.name().to_string(), action);
        self
    }

    /// Register an action, failing if the name is taken.
    pub fn register_unique(&mut self, action: Action) -> Result<&mut Self> {
        if self.actions.contains_key(action.name()) {
            return Err(SqlrigError::DuplicateAction(action.name().to_string()));
        }
        self.actions.insert(action.name().to_string(), action);
        Ok(self)
    }

    /// Register `name` as an action that runs `subactions` in order and
    /// returns their results as a JSON array.
    ///
    /// The subactions are captured as registered now; replacing one later
    /// does not change the composite.
    pub fn compose(
        &mut self,
        name: impl Into<String>,
        subactions: &[&str],
        description: impl Into<String>,
    ) -> Result<&mut Self> {
        let name = name.into();
        let mut parts = Vec::with_capacity(subactions.len());
        for sub in subactions {
            let action = self
                .actions
                .get(*sub)
                .ok_or_else(|| SqlrigError::UnknownAction {
                    composite: name.clone(),
                    missing: sub.to_string(),
                })?;
            parts.push(action.clone());
        }

        let affects_state = parts.iter().any(Action::modifies_state);
        let composed_of: BTreeSet<String> = parts
            .iter()
            .flat_map(|a| a.composed_of().iter().cloned())
            .collect();
        let dependencies: BTreeSet<String> = parts
            .iter()
            .flat_map(|a| a.dependencies().iter().cloned())
            .filter(|d| !composed_of.contains(d))
            .collect();

        let functions: Vec<ActionFn> = parts.iter().map(Action::function).collect();
        let function: ActionFn =
            Arc::new(move |ctx: &mut Context, args: &[String]| -> Result<Value> {
                let mut results = Vec::with_capacity(functions.len());
                for f in &functions {
                    results.push(f(ctx, args)?);
                }
                Ok(Value::Array(results))
            });

        let description = description.into();
        let action = Action::composite(
            name,
            function,
            (!description.is_empty()).then_some(description),
            affects_state,
            dependencies,
            composed_of,
        );
        Ok(self.register(action))
    }

    pub fn build(self) -> Registry {
        Registry {
            actions: self.actions,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Registry {
    actions: BTreeMap<String, Action>,
}

impl Registry {
    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.actions.keys().map(String::as_str)
    }

    /// Look `name` up and confirm `allowed` permits it.
    ///
    /// Checks, in order: the allow-list (unless it holds `ALL`), that any
    /// action is registered at all, that `name` is registered.
    pub fn check(&self, name: &str, allowed: &[String]) -> Result<&Action> {
        if !allowed.iter().any(|a| a == name || a == ALLOW_ALL) {
            let allowed = allowed.join(", ");
            tracing::error!(action = %name, allowed = %allowed, "action is not permitted");
            return Err(SqlrigError::NotPermitted {
                action: name.to_string(),
                allowed,
            });
        }
        if self.actions.is_empty() {
            tracing::error!("no actions defined");
            return Err(SqlrigError::EmptyRegistry);
        }
        match self.actions.get(name) {
            Some(action) => Ok(action),
            None => {
                let available = self.names().collect::<Vec<_>>().join(", ");
                tracing::error!(action = %name, available = %available, "no such action");
                Err(SqlrigError::NotRegistered {
                    action: name.to_string(),
                    available,
                })
            }
        }
    }

    pub fn validate(&self, name: &str, allowed: &[String]) -> bool {
        self.check(name, allowed).is_ok()
    }

    /// `(name, description)` for every action, alphabetically.
    pub fn list_all(&self) -> impl Iterator<Item = (&str, &str)> + Clone + '_ {
        self.actions
            .iter()
            .map(|(name, action)| (name.as_str(), action.description().unwrap_or(NO_DESCRIPTION)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sql::SqliteExecutor;
    use serde_json::json;

    fn noop(name: &str) -> Action {
        Action::new(name, |_, _| Ok(Value::Null))
    }

    fn echo(name: &'static str) -> Action {
        Action::new(name, move |_, _| Ok(json!(name)))
    }

    fn all() -> Vec<String> {
        vec!["ALL".to_string()]
    }

    fn ctx() -> Context {
        Context::new(
            std::env::temp_dir(),
            Config::new("registry-test"),
            Box::new(SqliteExecutor::in_memory().unwrap()),
        )
    }

    #[test]
    fn register_overwrites_last_write_wins() {
        let mut b = RegistryBuilder::new();
        b.register(noop("deploy").describe("first"));
        b.register(noop("deploy").describe("second"));
        let reg = b.build();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("deploy").unwrap().description(), Some("second"));
    }

    #[test]
    fn register_unique_rejects_duplicates() {
        let mut b = RegistryBuilder::new();
        b.register_unique(noop("deploy")).unwrap();
        let err = b.register_unique(noop("deploy")).unwrap_err();
        assert!(matches!(err, SqlrigError::DuplicateAction(n) if n == "deploy"));
    }

    #[test]
    fn compose_unions_dependencies_and_parts() {
        let mut b = RegistryBuilder::new();
        b.register(noop("a").depends_on(["x"]));
        b.register(noop("b").depends_on(["y"]).affects_state());
        b.compose("ab", &["a", "b"], "both").unwrap();
        let reg = b.build();
        let ab = reg.get("ab").unwrap();
        assert_eq!(ab.dependencies(), &BTreeSet::from(["x".into(), "y".into()]));
        assert_eq!(ab.composed_of(), &BTreeSet::from(["a".into(), "b".into()]));
        assert!(ab.modifies_state());
        assert_eq!(ab.description(), Some("both"));
    }

    #[test]
    fn compose_drops_dependencies_satisfied_internally() {
        let mut b = RegistryBuilder::new();
        b.register(noop("deploy"));
        b.register(noop("data").depends_on(["deploy"]));
        b.compose("complete-build", &["deploy", "data"], "").unwrap();
        let reg = b.build();
        let build = reg.get("complete-build").unwrap();
        assert!(build.dependencies().is_empty());
        assert!(build.description().is_none());
    }

    #[test]
    fn nested_composites_flatten_parts() {
        let mut b = RegistryBuilder::new();
        b.register(noop("a"));
        b.register(noop("b").depends_on(["a", "z"]));
        b.register(noop("c"));
        b.compose("ab", &["a", "b"], "").unwrap();
        b.compose("abc", &["ab", "c"], "").unwrap();
        let reg = b.build();
        let abc = reg.get("abc").unwrap();
        assert_eq!(
            abc.composed_of(),
            &BTreeSet::from(["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(abc.dependencies(), &BTreeSet::from(["z".into()]));
    }

    #[test]
    fn compose_unknown_subaction_fails() {
        let mut b = RegistryBuilder::new();
        b.register(noop("a"));
        let err = b.compose("ab", &["a", "missing"], "").unwrap_err();
        assert!(matches!(
            err,
            SqlrigError::UnknownAction { ref composite, ref missing }
                if composite == "ab" && missing == "missing"
        ));
    }

    #[test]
    fn composite_runs_parts_in_order_and_collects_results() {
        let mut b = RegistryBuilder::new();
        b.register(echo("first"));
        b.register(echo("second"));
        b.compose("both", &["second", "first"], "").unwrap();
        // Replacing a part after composing leaves the composite unchanged.
        b.register(echo("third").describe("unused"));
        b.register(Action::new("first", |_, _| Ok(json!("replaced"))));
        let reg = b.build();
        let out = reg.get("both").unwrap().call(&mut ctx(), &[]).unwrap();
        assert_eq!(out, json!(["second", "first"]));
    }

    #[test]
    fn composite_stops_at_first_error() {
        let mut b = RegistryBuilder::new();
        b.register(Action::new("fail", |_, _| Err(SqlrigError::Sql("boom".into()))));
        b.register(Action::new("never", |_, _| panic!("must not run")));
        b.compose("both", &["fail", "never"], "").unwrap();
        let reg = b.build();
        assert!(reg.get("both").unwrap().call(&mut ctx(), &[]).is_err());
    }

    #[test]
    fn validate_empty_allow_list_refuses_registered() {
        let mut b = RegistryBuilder::new();
        b.register(noop("deploy"));
        let reg = b.build();
        assert!(!reg.validate("deploy", &[]));
        assert!(matches!(
            reg.check("deploy", &[]),
            Err(SqlrigError::NotPermitted { .. })
        ));
    }

    #[test]
    fn validate_empty_registry_is_false_for_any_allow_list() {
        let reg = RegistryBuilder::new().build();
        assert!(!reg.validate("deploy", &all()));
        assert!(!reg.validate("deploy", &["deploy".to_string()]));
        assert!(matches!(
            reg.check("deploy", &all()),
            Err(SqlrigError::EmptyRegistry)
        ));
    }

    #[test]
    fn check_reports_not_registered_with_available_names() {
        let mut b = RegistryBuilder::new();
        b.register(noop("drop"));
        b.register(noop("deploy"));
        let reg = b.build();
        match reg.check("dpeloy", &all()) {
            Err(SqlrigError::NotRegistered { action, available }) => {
                assert_eq!(action, "dpeloy");
                assert_eq!(available, "deploy, drop");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn check_allows_explicitly_listed_action() {
        let mut b = RegistryBuilder::new();
        b.register(noop("deploy"));
        b.register(noop("drop"));
        let reg = b.build();
        let allowed = vec!["deploy".to_string()];
        assert!(reg.validate("deploy", &allowed));
        assert!(!reg.validate("drop", &allowed));
    }

    #[test]
    fn list_all_is_sorted_and_restartable() {
        let mut b = RegistryBuilder::new();
        b.register(noop("zeta").describe("last"));
        b.register(noop("alpha"));
        let reg = b.build();
        let listing = reg.list_all();
        let first: Vec<_> = listing.clone().collect();
        let second: Vec<_> = listing.collect();
        assert_eq!(first, vec![("alpha", NO_DESCRIPTION), ("zeta", "last")]);
        assert_eq!(first, second);
    }
}
