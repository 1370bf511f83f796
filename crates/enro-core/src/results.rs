//! Result channels: how a completed destination hands a value back to the
//! destination that opened it.
//!
//! A channel is registered under a [`ResultId`] owned by a destination. Opening
//! a key through the channel stamps that id into the instance metadata; when
//! the instance completes, the result is buffered in the [`ResultRegistry`]
//! and delivered once the owner is able to receive it.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use enro_types::{
    ContextId, EnroError, InstanceId, NavigationKeyInstance, ResultId, Result, SupportsPresent,
    SupportsPush, WithResult,
};

use crate::runtime::{ExecuteOutcome, NavigationRuntime};

/// The outcome of a destination opened for a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum NavigationResult<T> {
    Completed(T),
    /// Closed without producing a result.
    Closed,
}

impl<T> NavigationResult<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Closed => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl NavigationResult<serde_json::Value> {
    pub fn decode<T: DeserializeOwned>(self) -> Result<NavigationResult<T>> {
        Ok(match self {
            Self::Completed(value) => NavigationResult::Completed(serde_json::from_value(value)?),
            Self::Closed => NavigationResult::Closed,
        })
    }
}

// ---------------------------------------------------------------------------
// ResultRegistry
// ---------------------------------------------------------------------------

type ResultCallback = Box<dyn FnMut(NavigationResult<serde_json::Value>) + Send>;

struct ChannelEntry {
    callback: ResultCallback,
    once: bool,
}

/// Registered channels and results waiting for them.
///
/// Holds at most one pending result per id; buffering again replaces it.
/// Pending results are kept in the order they were buffered.
#[derive(Default)]
pub struct ResultRegistry {
    channels: HashMap<ResultId, ChannelEntry>,
    pending: Vec<(ResultId, NavigationResult<serde_json::Value>)>,
}

impl ResultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the channel for `id`.
    pub fn register_channel<F>(&mut self, id: ResultId, callback: F)
    where
        F: FnMut(NavigationResult<serde_json::Value>) + Send + 'static,
    {
        self.channels.insert(
            id,
            ChannelEntry {
                callback: Box::new(callback),
                once: false,
            },
        );
    }

    /// Register a channel that unregisters itself after its first delivery.
    pub fn register_once<F>(&mut self, id: ResultId, callback: F)
    where
        F: FnOnce(NavigationResult<serde_json::Value>) + Send + 'static,
    {
        let mut callback = Some(callback);
        self.channels.insert(
            id,
            ChannelEntry {
                callback: Box::new(move |result| {
                    if let Some(callback) = callback.take() {
                        callback(result);
                    }
                }),
                once: true,
            },
        );
    }

    pub fn unregister_channel(&mut self, id: &ResultId) -> bool {
        self.channels.remove(id).is_some()
    }

    pub fn has_channel(&self, id: &ResultId) -> bool {
        self.channels.contains_key(id)
    }

    /// Buffer `result` for `id`, returning the result it replaced.
    pub fn buffer(
        &mut self,
        id: ResultId,
        result: NavigationResult<serde_json::Value>,
    ) -> Option<NavigationResult<serde_json::Value>> {
        let replaced = self.take_pending(&id);
        self.pending.push((id, result));
        replaced
    }

    pub fn has_pending(&self, id: &ResultId) -> bool {
        self.pending.iter().any(|(pending, _)| pending == id)
    }

    /// Ids of pending results, oldest first.
    pub fn pending_ids(&self) -> Vec<ResultId> {
        self.pending.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn consume_pending_result(
        &mut self,
        id: &ResultId,
    ) -> Option<NavigationResult<serde_json::Value>> {
        self.take_pending(id)
    }

    fn take_pending(&mut self, id: &ResultId) -> Option<NavigationResult<serde_json::Value>> {
        let index = self.pending.iter().position(|(pending, _)| pending == id)?;
        Some(self.pending.remove(index).1)
    }

    /// Hand the pending result for `id` to its channel. Returns `false` when
    /// either side is missing; the pending result is left untouched then.
    pub fn deliver_pending(&mut self, id: &ResultId) -> bool {
        if !self.channels.contains_key(id) {
            return false;
        }
        let Some(result) = self.take_pending(id) else {
            return false;
        };
        let once = match self.channels.get_mut(id) {
            Some(entry) => {
                (entry.callback)(result);
                entry.once
            }
            None => false,
        };
        if once {
            self.channels.remove(id);
        }
        true
    }

    /// Forget every channel and pending result owned by `owner`, returning
    /// the ids of pending results that were dropped.
    pub fn drop_owner(&mut self, owner: InstanceId) -> Vec<ResultId> {
        self.channels.retain(|id, _| id.owner != owner);
        let (dropped, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(id, _)| id.owner == owner);
        self.pending = kept;
        dropped.into_iter().map(|(id, _)| id).collect()
    }
}

impl fmt::Debug for ResultRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultRegistry")
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .field("pending", &self.pending_ids())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ResultChannel
// ---------------------------------------------------------------------------

/// Typed handle for opening `K` so that its result reaches a registered callback.
pub struct ResultChannel<K> {
    id: ResultId,
    owner: ContextId,
    _key: PhantomData<fn() -> K>,
}

impl<K: WithResult> ResultChannel<K> {
    pub(crate) fn new(id: ResultId, owner: ContextId) -> Self {
        Self {
            id,
            owner,
            _key: PhantomData,
        }
    }

    pub fn id(&self) -> &ResultId {
        &self.id
    }

    /// Context of the destination that owns the channel.
    pub fn owner(&self) -> ContextId {
        self.owner
    }

    pub fn push(&self, runtime: &mut NavigationRuntime, key: &K) -> Result<ExecuteOutcome>
    where
        K: SupportsPush,
    {
        self.open(runtime, NavigationKeyInstance::push(key)?)
    }

    pub fn present(&self, runtime: &mut NavigationRuntime, key: &K) -> Result<ExecuteOutcome>
    where
        K: SupportsPresent,
    {
        self.open(runtime, NavigationKeyInstance::present(key)?)
    }

    fn open(
        &self,
        runtime: &mut NavigationRuntime,
        mut instance: NavigationKeyInstance,
    ) -> Result<ExecuteOutcome> {
        instance.metadata.result_id = Some(self.id.clone());
        runtime.open(self.owner, instance)
    }
}

impl<K> Clone for ResultChannel<K> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            owner: self.owner,
            _key: PhantomData,
        }
    }
}

impl<K> fmt::Debug for ResultChannel<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultChannel")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PendingResult
// ---------------------------------------------------------------------------

/// A result that will arrive after a later commit; await it without holding
/// the runtime.
#[derive(Debug)]
pub struct PendingResult<T> {
    id: ResultId,
    receiver: oneshot::Receiver<NavigationResult<serde_json::Value>>,
    _result: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> PendingResult<T> {
    pub(crate) fn new(
        id: ResultId,
        receiver: oneshot::Receiver<NavigationResult<serde_json::Value>>,
    ) -> Self {
        Self {
            id,
            receiver,
            _result: PhantomData,
        }
    }

    pub fn id(&self) -> &ResultId {
        &self.id
    }

    /// Wait for the result. Fails with `ResultChannelClosed` if the channel
    /// is dropped first, e.g. because its owner was destroyed.
    pub async fn wait(self) -> Result<NavigationResult<T>> {
        match self.receiver.await {
            Ok(result) => result.decode(),
            Err(_) => Err(EnroError::ResultChannelClosed(self.id)),
        }
    }
}
