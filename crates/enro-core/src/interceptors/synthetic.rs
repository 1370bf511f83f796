//! Synthetic destinations: keys bound to a block of code instead of a screen.
//!
//! Opening a synthetic key never creates a context node. The open is replaced
//! by a side effect that runs the bound block with a [`SyntheticScope`], which
//! can send a result back, forward to another destination, or open something
//! else from the requesting context.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use enro_types::{ContextId, NavigationKey, NavigationKeyInstance, Result};

use crate::interceptor::{InterceptContext, InterceptOutcome, NavigationInterceptor};
use crate::operation::{NavigationOperation, SideEffect};
use crate::results::NavigationResult;
use crate::runtime::{ExecuteOutcome, NavigationRuntime};

type SyntheticBlock = dyn Fn(&mut SyntheticScope<'_>) -> Result<()> + Send + Sync;

#[derive(Clone)]
pub struct SyntheticDestination {
    block: Arc<SyntheticBlock>,
}

impl SyntheticDestination {
    pub fn new<F>(block: F) -> Self
    where
        F: Fn(&mut SyntheticScope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            block: Arc::new(block),
        }
    }

    pub(crate) fn run(
        &self,
        runtime: &mut NavigationRuntime,
        from: ContextId,
        instance: NavigationKeyInstance,
    ) -> Result<()> {
        let mut scope = SyntheticScope {
            instance,
            from,
            runtime,
            resolved: false,
        };
        (self.block)(&mut scope)
    }
}

impl fmt::Debug for SyntheticDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SyntheticDestination")
    }
}

/// What a synthetic block can do while it runs.
pub struct SyntheticScope<'a> {
    instance: NavigationKeyInstance,
    from: ContextId,
    runtime: &'a mut NavigationRuntime,
    resolved: bool,
}

impl SyntheticScope<'_> {
    pub fn instance(&self) -> &NavigationKeyInstance {
        &self.instance
    }

    pub fn key<K: NavigationKey>(&self) -> Result<K> {
        self.instance.key()
    }

    /// The context that requested the synthetic key.
    pub fn from(&self) -> ContextId {
        self.from
    }

    pub fn runtime(&mut self) -> &mut NavigationRuntime {
        self.runtime
    }

    /// Send `result` to whoever opened this key for a result. Only the first
    /// completion or close of a scope is delivered.
    pub fn complete<T: Serialize>(&mut self, result: &T) -> Result<()> {
        let value = serde_json::to_value(result)?;
        self.resolve(NavigationResult::Completed(value));
        Ok(())
    }

    /// Tell whoever awaits a result that none is coming.
    pub fn close(&mut self) {
        self.resolve(NavigationResult::Closed);
    }

    /// Open `instance` from the requesting context.
    pub fn open(&mut self, instance: NavigationKeyInstance) -> Result<ExecuteOutcome> {
        self.runtime.open(self.from, instance)
    }

    /// Open `instance` so that its result goes to this key's caller.
    pub fn forward_result(
        &mut self,
        mut instance: NavigationKeyInstance,
    ) -> Result<ExecuteOutcome> {
        instance.metadata.result_id = self.instance.metadata.result_id.clone();
        self.resolved = true;
        self.runtime.open(self.from, instance)
    }

    fn resolve(&mut self, result: NavigationResult<serde_json::Value>) {
        if self.resolved {
            tracing::debug!(
                key_type = self.instance.key_type(),
                "Synthetic destination already resolved"
            );
            return;
        }
        self.resolved = true;
        match self.instance.metadata.result_id.clone() {
            Some(result_id) => self.runtime.deliver_result(result_id, result),
            None => tracing::debug!(
                key_type = self.instance.key_type(),
                "Synthetic destination has no result channel"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Interceptor
// ---------------------------------------------------------------------------

/// Replaces opens of synthetic keys with a side effect running their block.
pub struct SyntheticDestinationInterceptor;

impl NavigationInterceptor for SyntheticDestinationInterceptor {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn intercept(
        &self,
        ctx: &InterceptContext<'_>,
        operation: NavigationOperation,
    ) -> InterceptOutcome {
        let instance = match operation {
            NavigationOperation::Open(instance) => instance,
            other => return InterceptOutcome::Continue(other),
        };
        let Some(destination) = ctx
            .controller
            .bindings()
            .get(instance.key_type())
            .and_then(|b| b.synthetic_destination())
            .cloned()
        else {
            return InterceptOutcome::Continue(NavigationOperation::Open(instance));
        };

        let from = ctx.from;
        let label = format!("synthetic {}", instance.key_type());
        InterceptOutcome::Replaced(NavigationOperation::SideEffect(SideEffect::new(
            label,
            move |runtime| destination.run(runtime, from, instance.clone()),
        )))
    }
}
