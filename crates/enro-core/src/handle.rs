//! A destination's view of navigation.

use serde::Serialize;

use enro_types::{
    ContextId, EnroError, InstanceId, NavigationKey, NavigationKeyInstance, Result,
    SupportsPresent, SupportsPush, WithResult,
};

use crate::results::{NavigationResult, ResultChannel};
use crate::runtime::{ExecuteOutcome, NavigationRuntime};

/// Navigation handle bound to one destination context.
///
/// Opens are routed from the bound context; close and complete address the
/// bound instance and become no-ops once it has left the tree.
#[derive(Debug, Clone)]
pub struct NavigationHandle {
    context: ContextId,
    instance: NavigationKeyInstance,
}

impl NavigationHandle {
    /// # Panics
    ///
    /// Panics if `context` does not hold `instance`.
    pub fn bind(
        runtime: &NavigationRuntime,
        context: ContextId,
        instance: NavigationKeyInstance,
    ) -> Self {
        let bound = runtime
            .tree()
            .destination(context)
            .ok()
            .map(|d| d.instance.id);
        assert_eq!(
            bound,
            Some(instance.id),
            "navigation handle for {} bound to context {} which holds a different instance",
            instance.id,
            context
        );
        Self { context, instance }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn id(&self) -> InstanceId {
        self.instance.id
    }

    pub fn instance(&self) -> &NavigationKeyInstance {
        &self.instance
    }

    pub fn key<K: NavigationKey>(&self) -> Result<K> {
        self.instance.key()
    }

    pub fn is_active(&self, runtime: &NavigationRuntime) -> bool {
        runtime.tree().is_active_in_root(self.context)
    }

    pub fn open(
        &self,
        runtime: &mut NavigationRuntime,
        instance: NavigationKeyInstance,
    ) -> Result<ExecuteOutcome> {
        runtime.open(self.context, instance)
    }

    pub fn push<K: SupportsPush>(
        &self,
        runtime: &mut NavigationRuntime,
        key: &K,
    ) -> Result<ExecuteOutcome> {
        runtime.push(self.context, key)
    }

    pub fn present<K: SupportsPresent>(
        &self,
        runtime: &mut NavigationRuntime,
        key: &K,
    ) -> Result<ExecuteOutcome> {
        runtime.present(self.context, key)
    }

    pub fn close(&self, runtime: &mut NavigationRuntime) -> Result<ExecuteOutcome> {
        runtime.close_instance(self.instance.id)
    }

    pub fn complete<T: Serialize>(
        &self,
        runtime: &mut NavigationRuntime,
        result: &T,
    ) -> Result<ExecuteOutcome> {
        runtime.complete_instance(self.instance.id, result)
    }

    /// Complete with the result type declared by `K`, checking that the bound
    /// instance really holds a `K`.
    pub fn complete_for<K: WithResult>(
        &self,
        runtime: &mut NavigationRuntime,
        result: &K::Result,
    ) -> Result<ExecuteOutcome> {
        if !self.instance.key.is::<K>() {
            return Err(EnroError::KeyTypeMismatch {
                expected: K::KEY_TYPE.to_string(),
                actual: self.instance.key_type().to_string(),
            });
        }
        self.complete(runtime, result)
    }

    /// Register a result channel owned by this destination.
    pub fn result_channel<K, F>(
        &self,
        runtime: &mut NavigationRuntime,
        name: &str,
        callback: F,
    ) -> Result<ResultChannel<K>>
    where
        K: WithResult,
        F: FnMut(NavigationResult<K::Result>) + Send + 'static,
    {
        runtime.register_result_channel(self.context, name, callback)
    }
}
