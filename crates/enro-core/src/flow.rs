//! Async navigation flows.
//!
//! A flow runs a sequence of "open for result, await, decide" steps against a
//! runtime shared behind a [`tokio::sync::Mutex`]. The lock is held only for
//! the synchronous open; awaiting the result happens with the lock released
//! so the host can keep committing operations (including the completion the
//! flow is waiting for).

use std::sync::Arc;

use tokio::sync::Mutex;

use enro_types::{
    ContextId, NavigationKeyInstance, Result, SupportsPresent, SupportsPush, WithResult,
};

use crate::results::NavigationResult;
use crate::runtime::NavigationRuntime;

pub type SharedRuntime = Arc<Mutex<NavigationRuntime>>;

pub fn shared(runtime: NavigationRuntime) -> SharedRuntime {
    Arc::new(Mutex::new(runtime))
}

/// Opens destinations from `owner` and awaits their results.
#[derive(Clone)]
pub struct NavigationFlow {
    runtime: SharedRuntime,
    owner: ContextId,
}

impl NavigationFlow {
    pub fn new(runtime: SharedRuntime, owner: ContextId) -> Self {
        Self { runtime, owner }
    }

    pub fn owner(&self) -> ContextId {
        self.owner
    }

    pub async fn push_for_result<K>(&self, key: &K) -> Result<NavigationResult<K::Result>>
    where
        K: WithResult + SupportsPush,
    {
        self.open_for_result(NavigationKeyInstance::push(key)?).await
    }

    pub async fn present_for_result<K>(&self, key: &K) -> Result<NavigationResult<K::Result>>
    where
        K: WithResult + SupportsPresent,
    {
        self.open_for_result(NavigationKeyInstance::present(key)?).await
    }

    async fn open_for_result<T>(
        &self,
        instance: NavigationKeyInstance,
    ) -> Result<NavigationResult<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let pending = {
            let mut runtime = self.runtime.lock().await;
            runtime.open_for_result::<T>(self.owner, instance)?
        };
        tracing::debug!(result = %pending.id(), "Awaiting flow result");
        pending.wait().await
    }
}
