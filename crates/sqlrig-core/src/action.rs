use crate::context::Context;
use crate::error::Result;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The body of an action: receives the run context and any extra CLI args.
pub type ActionFn = Arc<dyn Fn(&mut Context, &[String]) -> Result<Value> + Send + Sync>;

/// A named, registrable build step.
#[derive(Clone)]
pub struct Action {
    name: String,
    function: ActionFn,
    description: Option<String>,
    affects_state: bool,
    dependencies: BTreeSet<String>,
    composed_of: BTreeSet<String>,
}

impl Action {
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&mut Context, &[String]) -> Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        let composed_of = BTreeSet::from([name.clone()]);
        Self {
            name,
            function: Arc::new(function),
            description: None,
            affects_state: false,
            dependencies: BTreeSet::new(),
            composed_of,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the action as changing the target database; runs ask for
    /// confirmation first.
    pub fn affects_state(mut self) -> Self {
        self.affects_state = true;
        self
    }

    /// Actions that must have completed before this one is meaningful.
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub(crate) fn composite(
        name: String,
        function: ActionFn,
        description: Option<String>,
        affects_state: bool,
        dependencies: BTreeSet<String>,
        composed_of: BTreeSet<String>,
    ) -> Self {
        Self {
            name,
            function,
            description,
            affects_state,
            dependencies,
            composed_of,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn modifies_state(&self) -> bool {
        self.affects_state
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// The primitive actions this action runs. `{name}` for a primitive.
    pub fn composed_of(&self) -> &BTreeSet<String> {
        &self.composed_of
    }

    pub(crate) fn function(&self) -> ActionFn {
        Arc::clone(&self.function)
    }

    pub fn call(&self, ctx: &mut Context, args: &[String]) -> Result<Value> {
        (self.function)(ctx, args)
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("affects_state", &self.affects_state)
            .field("dependencies", &self.dependencies)
            .field("composed_of", &self.composed_of)
            .finish_non_exhaustive()
    }
}
