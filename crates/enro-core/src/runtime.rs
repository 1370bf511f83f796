//! The navigation runtime.
//!
//! [`NavigationRuntime`] owns the context tree and the result registry. Every
//! change to either goes through it: operations are intercepted, validated as
//! a whole, and only then applied. A failed validation leaves the tree
//! exactly as it was.
//!
//! Commit order:
//! 1. backstacks: merge, tear down removed destinations, create new ones,
//!    move the active child to the top entry
//! 2. side effects, in aggregate order
//! 3. active state: lifecycles and the active leaf of every root
//! 4. results produced by completes and closes, then anything still pending

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};

use enro_types::{
    ContainerKey, ContextId, EnroError, InstanceId, NavigationKeyInstance, Result, ResultId,
    SupportsPresent, SupportsPush, WithResult,
};

use crate::context::{ContainerFilter, ContextNode, ContextTree, Lifecycle};
use crate::controller::EnroController;
use crate::events::NavigationEvent;
use crate::handle::NavigationHandle;
use crate::interceptor::{InterceptContext, InterceptOutcome, NavigationInterceptor};
use crate::merge::{merge_instances, removed_in_order};
use crate::operation::{NavigationOperation, SideEffect};
use crate::results::{NavigationResult, PendingResult, ResultChannel, ResultRegistry};
use crate::saved_state::{ContainerSnapshot, NavigationSnapshot};

/// What became of an executed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Committed,
    /// An interceptor cancelled it; nothing changed.
    Cancelled,
    /// The target is no longer in the tree.
    Ignored,
}

// ---------------------------------------------------------------------------
// Commit plan
// ---------------------------------------------------------------------------

/// Everything a commit will do, computed before anything is mutated.
#[derive(Default)]
struct CommitPlan {
    backstacks: BTreeMap<ContextId, Vec<NavigationKeyInstance>>,
    /// Instances staged by an `Open`, with the container they open into.
    opened: HashMap<InstanceId, ContextId>,
    results: Vec<(ResultId, NavigationResult<serde_json::Value>)>,
    effects: Vec<SideEffect>,
}

impl CommitPlan {
    fn backstack(
        &mut self,
        tree: &ContextTree,
        container: ContextId,
    ) -> Result<&mut Vec<NavigationKeyInstance>> {
        if !self.backstacks.contains_key(&container) {
            let current = tree.container(container)?.backstack().to_vec();
            self.backstacks.insert(container, current);
        }
        Ok(self.backstacks.entry(container).or_default())
    }

    /// Drop `instance` from whichever staged backstack holds it. Staged
    /// backstacks are searched first so an instance opened earlier in the
    /// same commit can be closed again.
    fn remove(&mut self, tree: &ContextTree, instance: InstanceId) -> Result<bool> {
        let staged = self
            .backstacks
            .iter()
            .find(|(_, backstack)| backstack.iter().any(|i| i.id == instance))
            .map(|(container, _)| *container);
        let Some(holder) = staged.or_else(|| tree.container_holding(instance)) else {
            return Ok(false);
        };
        let backstack = self.backstack(tree, holder)?;
        let before = backstack.len();
        backstack.retain(|i| i.id != instance);
        let removed = backstack.len() != before;
        if removed {
            self.opened.remove(&instance);
        }
        Ok(removed)
    }

    /// Containers that still receive an open once the plan is complete.
    fn activated(&self) -> HashSet<ContextId> {
        self.opened.values().copied().collect()
    }
}

// ---------------------------------------------------------------------------
// NavigationRuntime
// ---------------------------------------------------------------------------

pub struct NavigationRuntime {
    controller: Arc<EnroController>,
    tree: ContextTree,
    results: ResultRegistry,
    /// Last reported active leaf per root.
    active_leaves: HashMap<ContextId, Option<InstanceId>>,
}

impl NavigationRuntime {
    pub fn new(controller: Arc<EnroController>) -> Self {
        Self {
            controller,
            tree: ContextTree::new(),
            results: ResultRegistry::new(),
            active_leaves: HashMap::new(),
        }
    }

    pub fn controller(&self) -> &Arc<EnroController> {
        &self.controller
    }

    pub fn tree(&self) -> &ContextTree {
        &self.tree
    }

    pub fn results(&self) -> &ResultRegistry {
        &self.results
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.controller.events().subscribe()
    }

    fn emit(&self, event: NavigationEvent) {
        self.controller.events().emit(event);
    }

    // --- host entry points ---

    pub fn create_root(&mut self, host: impl Into<String>) -> ContextId {
        let host = host.into();
        let id = self.tree.insert_root(host.clone());
        tracing::debug!(root = %id, host = %host, "Root created");
        id
    }

    pub fn add_container(
        &mut self,
        parent: ContextId,
        key: ContainerKey,
        filter: ContainerFilter,
    ) -> Result<ContextId> {
        let id = self.tree.insert_container(parent, key.clone(), filter)?;
        tracing::debug!(container = %key, parent = %parent, "Container added");
        self.refresh_active();
        Ok(id)
    }

    pub fn add_container_interceptor(
        &mut self,
        container: ContextId,
        interceptor: Arc<dyn NavigationInterceptor>,
    ) -> Result<()> {
        self.tree.container_mut(container)?.add_interceptor(interceptor);
        Ok(())
    }

    /// Forward a host lifecycle change. `Destroyed` removes the destination
    /// without running interceptors.
    pub fn set_lifecycle(&mut self, context: ContextId, lifecycle: Lifecycle) -> Result<()> {
        if lifecycle == Lifecycle::Destroyed {
            let instance = self.tree.destination(context)?.instance.clone();
            let mut plan = CommitPlan::default();
            plan.remove(&self.tree, instance.id)?;
            self.apply_backstacks(plan.backstacks, &HashSet::new())?;
            if let Some(key) = &instance.metadata.previously_active_container {
                if self.tree.find_container(key).is_some() {
                    self.set_active_container(key)?;
                }
            }
            self.refresh_active();
            if let Some(result_id) = instance.metadata.result_id {
                self.deliver_result(result_id, NavigationResult::Closed);
            }
            self.flush_pending();
            return Ok(());
        }

        self.tree.destination_mut(context)?.lifecycle = lifecycle;
        if lifecycle.is_at_least_started() {
            self.flush_pending();
        }
        Ok(())
    }

    /// Remove a root and everything below it.
    pub fn destroy_root(&mut self, root: ContextId) -> Result<()> {
        let host = self.tree.root(root)?.host.clone();
        let removed = self.tree.remove_subtree(root);
        self.tear_down(removed);
        self.active_leaves.remove(&root);
        tracing::debug!(root = %root, host = %host, "Root destroyed");
        Ok(())
    }

    /// Create a root for `host` with a single container and open `instance` in it.
    pub fn host_in_root(
        &mut self,
        host: impl Into<String>,
        mut instance: NavigationKeyInstance,
    ) -> Result<ContextId> {
        let host = host.into();
        let root = self.create_root(host.clone());
        let key = ContainerKey::new(format!("{}-{}", host, root.raw()));
        let container = self.add_container(root, key, ContainerFilter::All)?;
        instance.metadata.opened_in_root = true;
        self.execute(root, container, NavigationOperation::Open(instance))?;
        Ok(root)
    }

    // --- execution ---

    /// Run `operation` through the interceptor chain of `container` and
    /// commit whatever survives.
    pub fn execute(
        &mut self,
        from: ContextId,
        container: ContextId,
        operation: NavigationOperation,
    ) -> Result<ExecuteOutcome> {
        let key = self.tree.container(container)?.key.clone();
        let kind = operation.kind();
        let operation = self.resolve_stored(operation);

        let controller = Arc::clone(&self.controller);
        let chain = controller.interceptor_chain(&self.tree, container);
        let ctx = InterceptContext {
            from,
            container,
            tree: &self.tree,
            controller: &controller,
        };
        let outcome = chain.process(&ctx, operation);
        match outcome {
            InterceptOutcome::Continue(op) | InterceptOutcome::Replaced(op) => {
                self.commit(from, container, op)?;
                Ok(ExecuteOutcome::Committed)
            }
            InterceptOutcome::Cancelled => {
                self.cancelled(key, kind);
                Ok(ExecuteOutcome::Cancelled)
            }
            InterceptOutcome::CancelAnd(effect) => {
                self.cancelled(key, kind);
                effect.run(self)?;
                Ok(ExecuteOutcome::Cancelled)
            }
        }
    }

    fn cancelled(&self, container: ContainerKey, operation: &str) {
        tracing::debug!(container = %container, operation, "Operation cancelled");
        self.emit(NavigationEvent::OperationCancelled {
            container,
            operation: operation.to_string(),
        });
    }

    /// Swap the instances of closes and completes for the stored ones, so
    /// interceptors see the metadata stamped at open time.
    fn resolve_stored(&self, operation: NavigationOperation) -> NavigationOperation {
        let children = operation
            .into_children()
            .into_iter()
            .map(|mut op| {
                if !matches!(op, NavigationOperation::Open(_)) {
                    if let Some(instance) = op.instance_mut() {
                        if let Some(stored) = self.tree.instance(instance.id) {
                            *instance = stored.clone();
                        }
                    }
                }
                op
            })
            .collect();
        NavigationOperation::Aggregate(children)
    }

    fn commit(
        &mut self,
        from: ContextId,
        container: ContextId,
        operation: NavigationOperation,
    ) -> Result<()> {
        let plan = self.plan(from, container, operation)?;
        let activated = plan.activated();
        let CommitPlan {
            backstacks,
            results,
            effects,
            ..
        } = plan;

        self.apply_backstacks(backstacks, &activated)?;
        for effect in &effects {
            effect.run(self)?;
        }
        self.refresh_active();
        for (result_id, result) in results {
            self.deliver_result(result_id, result);
        }
        self.flush_pending();

        if self.controller.config().log_tree_on_commit {
            for root in self.tree.roots() {
                tracing::debug!(tree = %self.tree.get_debug_string(*root), "Context tree");
            }
        }
        Ok(())
    }

    /// Validate the whole operation against the current tree.
    fn plan(
        &self,
        from: ContextId,
        container: ContextId,
        operation: NavigationOperation,
    ) -> Result<CommitPlan> {
        let mut plan = CommitPlan::default();
        let mut opening = HashSet::new();
        let mut closing = HashSet::new();

        for op in operation.into_children() {
            match op {
                NavigationOperation::Open(instance) => {
                    let binding = self.controller.bindings().require(instance.key_type())?;
                    // Reached here only if an interceptor replaced the op
                    // ahead of the system interceptors.
                    if let Some(destination) = binding.synthetic_destination().cloned() {
                        let label = format!("synthetic {}", instance.key_type());
                        plan.effects.push(SideEffect::new(label, move |runtime| {
                            destination.run(runtime, from, instance.clone())
                        }));
                        continue;
                    }
                    if binding.is_root() && !instance.metadata.opened_in_root {
                        let label = format!("open {} in root", instance.key_type());
                        plan.effects.push(SideEffect::new(label, move |runtime| {
                            runtime.open_in_root(instance.clone())
                        }));
                        continue;
                    }

                    let target = self.tree.container(container)?;
                    if !target.filter.accepts(instance.key_type()) {
                        return Err(EnroError::RejectedByContainer {
                            container: target.key.clone(),
                            key_type: instance.key_type().to_string(),
                        });
                    }
                    let live = self.tree.contains_instance(instance.id)
                        && !closing.contains(&instance.id);
                    if live || !opening.insert(instance.id) {
                        return Err(EnroError::DuplicateInstance {
                            instance: instance.id,
                        });
                    }
                    plan.opened.insert(instance.id, container);
                    plan.backstack(&self.tree, container)?.push(instance);
                }
                NavigationOperation::Close(instance) => {
                    if !plan.remove(&self.tree, instance.id)? {
                        tracing::debug!(instance = %instance.id, "Close target is not in the tree");
                        continue;
                    }
                    opening.remove(&instance.id);
                    closing.insert(instance.id);
                    if let Some(result_id) = instance.metadata.result_id {
                        plan.results.push((result_id, NavigationResult::Closed));
                    }
                }
                NavigationOperation::Complete { instance, result } => {
                    if !plan.remove(&self.tree, instance.id)? {
                        tracing::debug!(
                            instance = %instance.id,
                            "Complete target is not in the tree"
                        );
                        continue;
                    }
                    opening.remove(&instance.id);
                    closing.insert(instance.id);
                    match instance.metadata.result_id {
                        Some(result_id) => {
                            plan.results.push((result_id, NavigationResult::Completed(result)))
                        }
                        None => tracing::debug!(
                            instance = %instance.id,
                            "Completed instance was not opened for a result"
                        ),
                    }
                }
                NavigationOperation::SideEffect(effect) => plan.effects.push(effect),
                // Flattened by into_children.
                NavigationOperation::Aggregate(_) => {}
            }
        }
        Ok(plan)
    }

    fn apply_backstacks(
        &mut self,
        backstacks: BTreeMap<ContextId, Vec<NavigationKeyInstance>>,
        activated: &HashSet<ContextId>,
    ) -> Result<()> {
        let controller = Arc::clone(&self.controller);

        // Tear down everything that goes away before creating anything, so
        // an instance can move between containers in one commit.
        let mut changes = Vec::with_capacity(backstacks.len());
        for (container, next) in backstacks {
            let previous = self.tree.container(container)?.backstack().to_vec();
            let unchanged = previous.iter().map(|i| i.id).eq(next.iter().map(|i| i.id));
            if unchanged && !activated.contains(&container) {
                continue;
            }
            let merged = merge_instances(&previous, &next);
            for instance in removed_in_order(&merged, &next) {
                self.destroy_instance(instance);
            }
            changes.push((container, previous, next, merged));
        }

        for (container, previous, next, merged) in changes {
            let key = self.tree.container(container)?.key.clone();
            for instance in next.iter().filter(|i| !previous.iter().any(|p| p.id == i.id)) {
                self.tree
                    .insert_destination(container, instance.clone(), Lifecycle::Created)?;
                for plugin in controller.plugins().iter() {
                    plugin.on_opened(instance);
                }
                tracing::debug!(
                    container = %key,
                    instance = %instance.id,
                    key_type = instance.key_type(),
                    "Destination created"
                );
                self.emit(NavigationEvent::DestinationCreated {
                    container: key.clone(),
                    instance: instance.id,
                    key_type: instance.key_type().to_string(),
                });
            }

            let children = next
                .iter()
                .filter_map(|i| self.tree.destination_for(i.id))
                .collect();
            self.tree.reorder_children(container, children)?;
            let top = next.last().and_then(|i| self.tree.destination_for(i.id));
            self.tree.set_active_child(container, top)?;
            if activated.contains(&container) {
                if let Some(parent) = self.tree.parent(container) {
                    self.tree.set_active_child(parent, Some(container))?;
                }
            }

            let ids =
                |list: &[NavigationKeyInstance]| list.iter().map(|i| i.id).collect::<Vec<_>>();
            let event = NavigationEvent::BackstackUpdated {
                container: key.clone(),
                previous: ids(&previous),
                current: ids(&next),
                merged: ids(&merged),
            };
            tracing::debug!(container = %key, size = next.len(), "Backstack updated");
            self.tree.container_mut(container)?.set_backstack(next);
            self.emit(event);
        }
        Ok(())
    }

    fn destroy_instance(&mut self, instance: InstanceId) {
        if let Some(context) = self.tree.destination_for(instance) {
            let removed = self.tree.remove_subtree(context);
            self.tear_down(removed);
        }
    }

    fn tear_down(&mut self, removed: Vec<ContextNode>) {
        let controller = Arc::clone(&self.controller);
        for node in removed {
            let Some(destination) = node.as_destination() else {
                continue;
            };
            let instance = &destination.instance;
            for result_id in self.results.drop_owner(instance.id) {
                tracing::warn!(result = %result_id, "Dropping pending result, owner destroyed");
                self.emit(NavigationEvent::ResultDropped {
                    result_id,
                    reason: "owner destroyed".into(),
                });
            }
            for plugin in controller.plugins().iter() {
                plugin.on_closed(instance);
            }
            tracing::debug!(
                instance = %instance.id,
                key_type = instance.key_type(),
                "Destination destroyed"
            );
            self.emit(NavigationEvent::DestinationDestroyed {
                instance: instance.id,
                key_type: instance.key_type().to_string(),
            });
        }
    }

    // --- active state ---

    fn refresh_active(&mut self) {
        if self.controller.config().manage_lifecycle {
            self.update_lifecycles();
        }

        let controller = Arc::clone(&self.controller);
        let roots = self.tree.roots().to_vec();
        for root in roots {
            let leaf = self
                .tree
                .active_leaf(root)
                .and_then(|id| self.tree.destination(id).ok())
                .map(|d| d.instance.clone());
            let leaf_id = leaf.as_ref().map(|i| i.id);
            match self.active_leaves.insert(root, leaf_id) {
                Some(previous) if previous == leaf_id => continue,
                None if leaf_id.is_none() => continue,
                _ => {}
            }

            if let Some(instance) = &leaf {
                for plugin in controller.plugins().iter() {
                    plugin.on_active(instance);
                }
            }
            let host = self
                .tree
                .root(root)
                .map(|r| r.host.clone())
                .unwrap_or_default();
            tracing::debug!(root = %host, instance = ?leaf_id, "Active destination changed");
            self.emit(NavigationEvent::ActiveChanged {
                root: host,
                instance: leaf_id,
            });
        }
    }

    /// Active path destinations are resumed, other visible destinations are
    /// started, everything else is created.
    fn update_lifecycles(&mut self) {
        let roots = self.tree.roots().to_vec();
        let on_path: HashSet<ContextId> = roots
            .iter()
            .flat_map(|root| self.tree.active_path(*root))
            .collect();
        let destinations: Vec<ContextId> = roots
            .iter()
            .flat_map(|root| self.tree.find_all_destinations(*root))
            .collect();

        for id in destinations {
            let desired = if on_path.contains(&id) {
                Lifecycle::Resumed
            } else if self.tree.is_visible(id) {
                Lifecycle::Started
            } else {
                Lifecycle::Created
            };
            if let Ok(destination) = self.tree.destination_mut(id) {
                if destination.lifecycle != desired {
                    tracing::trace!(
                        instance = %destination.instance.id,
                        from = destination.lifecycle.name(),
                        to = desired.name(),
                        "Lifecycle changed"
                    );
                    destination.lifecycle = desired;
                }
            }
        }
    }

    /// Make the container named `key` the active child of its parent.
    pub fn set_active_container(&mut self, key: &ContainerKey) -> Result<()> {
        let container = self
            .tree
            .find_container(key)
            .ok_or_else(|| EnroError::ContainerNotFound(key.clone()))?;
        let parent = self
            .tree
            .parent(container)
            .ok_or(EnroError::ContextNotFound(container))?;
        self.tree.set_active_child(parent, Some(container))?;
        tracing::debug!(container = %key, "Container activated");
        self.refresh_active();
        self.flush_pending();
        Ok(())
    }

    // --- routing helpers ---

    /// Open `instance` in the container that should host it, searching from
    /// `from` outwards.
    pub fn open(
        &mut self,
        from: ContextId,
        instance: NavigationKeyInstance,
    ) -> Result<ExecuteOutcome> {
        let key_type = instance.key_type().to_string();
        let binding = self.controller.bindings().require(&key_type)?;
        let fallback = binding.is_root() || binding.synthetic_destination().is_some();
        let container = self
            .tree
            .find_container_for(from, &key_type, fallback)
            .ok_or(EnroError::NoContainerFor { key_type, from })?;
        self.execute(from, container, NavigationOperation::Open(instance))
    }

    pub fn push<K: SupportsPush>(&mut self, from: ContextId, key: &K) -> Result<ExecuteOutcome> {
        self.open(from, NavigationKeyInstance::push(key)?)
    }

    pub fn present<K: SupportsPresent>(
        &mut self,
        from: ContextId,
        key: &K,
    ) -> Result<ExecuteOutcome> {
        self.open(from, NavigationKeyInstance::present(key)?)
    }

    /// Close the destination at `context`.
    pub fn close(&mut self, context: ContextId) -> Result<ExecuteOutcome> {
        let instance = self.tree.destination(context)?.instance.clone();
        let container = self
            .tree
            .parent(context)
            .ok_or(EnroError::ContextNotFound(context))?;
        self.execute(context, container, NavigationOperation::Close(instance))
    }

    /// Complete the destination at `context` with `result`.
    pub fn complete<T: Serialize>(
        &mut self,
        context: ContextId,
        result: &T,
    ) -> Result<ExecuteOutcome> {
        let instance = self.tree.destination(context)?.instance.clone();
        let container = self
            .tree
            .parent(context)
            .ok_or(EnroError::ContextNotFound(context))?;
        self.execute(context, container, NavigationOperation::complete(instance, result)?)
    }

    /// Like [`close`](Self::close), addressed by instance; a no-op once the
    /// instance has left the tree.
    pub fn close_instance(&mut self, instance: InstanceId) -> Result<ExecuteOutcome> {
        match self.tree.destination_for(instance) {
            Some(context) => self.close(context),
            None => {
                tracing::debug!(instance = %instance, "Close ignored, instance is gone");
                Ok(ExecuteOutcome::Ignored)
            }
        }
    }

    /// Like [`complete`](Self::complete), addressed by instance; completing
    /// twice is a no-op.
    pub fn complete_instance<T: Serialize>(
        &mut self,
        instance: InstanceId,
        result: &T,
    ) -> Result<ExecuteOutcome> {
        match self.tree.destination_for(instance) {
            Some(context) => self.complete(context, result),
            None => {
                tracing::debug!(instance = %instance, "Complete ignored, instance is gone");
                Ok(ExecuteOutcome::Ignored)
            }
        }
    }

    /// Close the active leaf of `root`.
    pub fn handle_back(&mut self, root: ContextId) -> Result<ExecuteOutcome> {
        self.tree.root(root)?;
        match self.tree.active_leaf(root) {
            Some(leaf) => self.close(leaf),
            None => Ok(ExecuteOutcome::Ignored),
        }
    }

    /// Hand `instance` to the host's root handler.
    pub fn open_in_root(&mut self, mut instance: NavigationKeyInstance) -> Result<()> {
        instance.metadata.opened_in_root = true;
        let handler = self
            .controller
            .root_handler()
            .cloned()
            .ok_or_else(|| EnroError::MissingRootHost {
                key_type: instance.key_type().to_string(),
            })?;
        tracing::debug!(
            instance = %instance.id,
            key_type = instance.key_type(),
            "Redirecting to root host"
        );
        self.emit(NavigationEvent::RootRedirected {
            instance: instance.id,
            key_type: instance.key_type().to_string(),
        });
        handler.open_root(&instance)
    }

    pub fn handle_for(&self, context: ContextId) -> Result<NavigationHandle> {
        let instance = self.tree.destination(context)?.instance.clone();
        Ok(NavigationHandle::bind(self, context, instance))
    }

    // --- results ---

    /// Buffer `result` for `result_id` and deliver it if the owner can
    /// receive it now.
    pub fn deliver_result(
        &mut self,
        result_id: ResultId,
        result: NavigationResult<serde_json::Value>,
    ) {
        if !self.tree.contains_instance(result_id.owner) {
            tracing::warn!(result = %result_id, "Dropping result, owner is not in the tree");
            self.emit(NavigationEvent::ResultDropped {
                result_id,
                reason: "owner not in tree".into(),
            });
            return;
        }
        if self.results.buffer(result_id.clone(), result).is_some() {
            tracing::debug!(result = %result_id, "Replaced an undelivered result");
        }
        self.emit(NavigationEvent::ResultBuffered {
            result_id: result_id.clone(),
        });
        self.try_deliver(&result_id);
    }

    fn try_deliver(&mut self, result_id: &ResultId) -> bool {
        let ready = self
            .tree
            .destination_for(result_id.owner)
            .and_then(|ctx| self.tree.destination(ctx).ok())
            .is_some_and(|d| d.lifecycle.is_at_least_started());
        if !ready || !self.results.deliver_pending(result_id) {
            return false;
        }
        tracing::debug!(result = %result_id, "Result delivered");
        self.emit(NavigationEvent::ResultDelivered {
            result_id: result_id.clone(),
        });
        true
    }

    fn flush_pending(&mut self) {
        for result_id in self.results.pending_ids() {
            self.try_deliver(&result_id);
        }
    }

    /// Register a typed result channel owned by the destination at `owner`.
    /// A result already pending under the same id is delivered right away.
    pub fn register_result_channel<K, F>(
        &mut self,
        owner: ContextId,
        name: &str,
        mut callback: F,
    ) -> Result<ResultChannel<K>>
    where
        K: WithResult,
        F: FnMut(NavigationResult<K::Result>) + Send + 'static,
    {
        let owner_instance = self.tree.destination(owner)?.instance.id;
        let result_id = ResultId::new(owner_instance, name);
        let label = result_id.clone();
        self.results
            .register_channel(result_id.clone(), move |result| match result.decode::<K::Result>() {
                Ok(result) => callback(result),
                Err(err) => {
                    tracing::warn!(
                        result = %label,
                        error = %err,
                        "Result does not match channel type"
                    )
                }
            });
        self.try_deliver(&result_id);
        Ok(ResultChannel::new(result_id, owner))
    }

    pub fn unregister_result_channel(&mut self, result_id: &ResultId) -> bool {
        self.results.unregister_channel(result_id)
    }

    /// Open `instance` from the destination at `from` and return a handle
    /// for its result. The handle resolves with `ResultChannelClosed` if the
    /// open is cancelled or `from` is destroyed first.
    pub fn open_for_result<T: DeserializeOwned>(
        &mut self,
        from: ContextId,
        mut instance: NavigationKeyInstance,
    ) -> Result<PendingResult<T>> {
        let owner = self.tree.destination(from)?.instance.id;
        let result_id = ResultId::new(owner, format!("pending-{}", instance.id.short()));
        let (tx, rx) = oneshot::channel();
        self.results.register_once(result_id.clone(), move |result| {
            let _ = tx.send(result);
        });

        instance.metadata.result_id = Some(result_id.clone());
        match self.open(from, instance) {
            Ok(ExecuteOutcome::Committed) => {}
            Ok(_) => {
                self.results.unregister_channel(&result_id);
            }
            Err(err) => {
                self.results.unregister_channel(&result_id);
                return Err(err);
            }
        }
        Ok(PendingResult::new(result_id, rx))
    }

    pub fn push_for_result<K>(
        &mut self,
        from: ContextId,
        key: &K,
    ) -> Result<PendingResult<K::Result>>
    where
        K: WithResult + SupportsPush,
    {
        self.open_for_result(from, NavigationKeyInstance::push(key)?)
    }

    pub fn present_for_result<K>(
        &mut self,
        from: ContextId,
        key: &K,
    ) -> Result<PendingResult<K::Result>>
    where
        K: WithResult + SupportsPresent,
    {
        self.open_for_result(from, NavigationKeyInstance::present(key)?)
    }

    // --- saved state ---

    /// Backstacks of every container, in pre-order across roots.
    pub fn snapshot(&self) -> NavigationSnapshot {
        let containers = self
            .tree
            .roots()
            .iter()
            .flat_map(|root| self.tree.find_all_containers(*root))
            .filter_map(|id| self.tree.container(id).ok())
            .map(|c| ContainerSnapshot {
                key: c.key.clone(),
                backstack: c.backstack().to_vec(),
            })
            .collect();
        NavigationSnapshot::new(containers)
    }

    /// Replace the backstack of the container named in `snapshot` with the
    /// saved one. The change is intercepted like any other.
    pub fn restore_container(&mut self, snapshot: &ContainerSnapshot) -> Result<ExecuteOutcome> {
        let container = self
            .tree
            .find_container(&snapshot.key)
            .ok_or_else(|| EnroError::ContainerNotFound(snapshot.key.clone()))?;
        let current = self.tree.container(container)?.backstack().to_vec();
        let operation = NavigationOperation::set_backstack(&current, snapshot.backstack.clone());
        self.execute(container, container, operation)
    }

    /// Restore every container of `snapshot` that exists in the tree,
    /// returning the keys that had no container.
    pub fn restore(&mut self, snapshot: &NavigationSnapshot) -> Result<Vec<ContainerKey>> {
        let mut missing = Vec::new();
        for container in &snapshot.containers {
            if self.tree.find_container(&container.key).is_none() {
                missing.push(container.key.clone());
                continue;
            }
            self.restore_container(container)?;
        }
        Ok(missing)
    }
}

impl std::fmt::Debug for NavigationRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationRuntime")
            .field("contexts", &self.tree.len())
            .field("results", &self.results)
            .finish()
    }
}
