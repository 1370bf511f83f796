//! The navigation context tree.
//!
//! Root, container and destination contexts live in one arena keyed by
//! [`ContextId`]. Parents own the registration of their children; children
//! refer back to their parent by id only. Mutation is crate-private so that
//! every change goes through the runtime's commit path.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use enro_types::{
    ContainerKey, ContextId, EnroError, InstanceId, NavigationKeyInstance, Result,
};

use crate::interceptor::NavigationInterceptor;

// ---------------------------------------------------------------------------
// Lifecycle & filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Created,
    Started,
    Resumed,
    Destroyed,
}

impl Lifecycle {
    /// Results are only delivered to owners that are at least started.
    pub fn is_at_least_started(self) -> bool {
        matches!(self, Lifecycle::Started | Lifecycle::Resumed)
    }

    pub fn name(self) -> &'static str {
        match self {
            Lifecycle::Created => "created",
            Lifecycle::Started => "started",
            Lifecycle::Resumed => "resumed",
            Lifecycle::Destroyed => "destroyed",
        }
    }
}

/// Which key types a container accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "key_types")]
pub enum ContainerFilter {
    #[default]
    All,
    Only(Vec<String>),
    Except(Vec<String>),
}

impl ContainerFilter {
    pub fn only<I, S>(key_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(key_types.into_iter().map(Into::into).collect())
    }

    pub fn accepts(&self, key_type: &str) -> bool {
        match self {
            ContainerFilter::All => true,
            ContainerFilter::Only(types) => types.iter().any(|t| t == key_type),
            ContainerFilter::Except(types) => !types.iter().any(|t| t == key_type),
        }
    }
}

// ---------------------------------------------------------------------------
// Context kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RootContext {
    pub host: String,
}

pub struct ContainerContext {
    pub key: ContainerKey,
    pub filter: ContainerFilter,
    backstack: Vec<NavigationKeyInstance>,
    interceptors: Vec<Arc<dyn NavigationInterceptor>>,
}

impl ContainerContext {
    pub fn backstack(&self) -> &[NavigationKeyInstance] {
        &self.backstack
    }

    pub fn backstack_ids(&self) -> Vec<InstanceId> {
        self.backstack.iter().map(|i| i.id).collect()
    }

    pub fn top(&self) -> Option<&NavigationKeyInstance> {
        self.backstack.last()
    }

    pub fn interceptors(&self) -> &[Arc<dyn NavigationInterceptor>] {
        &self.interceptors
    }

    pub(crate) fn set_backstack(&mut self, backstack: Vec<NavigationKeyInstance>) {
        self.backstack = backstack;
    }

    pub(crate) fn add_interceptor(&mut self, interceptor: Arc<dyn NavigationInterceptor>) {
        self.interceptors.push(interceptor);
    }
}

impl fmt::Debug for ContainerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerContext")
            .field("key", &self.key)
            .field("filter", &self.filter)
            .field("backstack", &self.backstack_ids())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DestinationContext {
    pub instance: NavigationKeyInstance,
    pub lifecycle: Lifecycle,
}

#[derive(Debug)]
pub enum ContextKind {
    Root(RootContext),
    Container(ContainerContext),
    Destination(DestinationContext),
}

impl ContextKind {
    pub fn name(&self) -> &'static str {
        match self {
            ContextKind::Root(_) => "root",
            ContextKind::Container(_) => "container",
            ContextKind::Destination(_) => "destination",
        }
    }
}

#[derive(Debug)]
pub struct ContextNode {
    id: ContextId,
    parent: Option<ContextId>,
    children: Vec<ContextId>,
    active_child: Option<ContextId>,
    kind: ContextKind,
}

impl ContextNode {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    pub fn children(&self) -> &[ContextId] {
        &self.children
    }

    pub fn active_child(&self) -> Option<ContextId> {
        self.active_child
    }

    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    pub fn as_destination(&self) -> Option<&DestinationContext> {
        match &self.kind {
            ContextKind::Destination(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&ContainerContext> {
        match &self.kind {
            ContextKind::Container(c) => Some(c),
            _ => None,
        }
    }

    fn debug_label(&self) -> String {
        match &self.kind {
            ContextKind::Root(root) => format!("Root({})", root.host),
            ContextKind::Container(container) => format!(
                "Container({}) [{} entries]",
                container.key,
                container.backstack.len()
            ),
            ContextKind::Destination(destination) => format!(
                "Destination({} {}, {})",
                destination.instance.key_type(),
                destination.instance.id.short(),
                destination.lifecycle.name()
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// ContextTree
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ContextTree {
    next_id: u64,
    nodes: BTreeMap<ContextId, ContextNode>,
    roots: Vec<ContextId>,
    containers: HashMap<ContainerKey, ContextId>,
    destinations: HashMap<InstanceId, ContextId>,
}

impl ContextTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> ContextId {
        let id = ContextId::new(self.next_id);
        self.next_id += 1;
        id
    }

    // --- construction ---

    pub(crate) fn insert_root(&mut self, host: impl Into<String>) -> ContextId {
        let id = self.allocate();
        self.nodes.insert(
            id,
            ContextNode {
                id,
                parent: None,
                children: Vec::new(),
                active_child: None,
                kind: ContextKind::Root(RootContext { host: host.into() }),
            },
        );
        self.roots.push(id);
        id
    }

    /// Add a container under a root or destination. The first container a
    /// parent receives becomes its active child.
    pub(crate) fn insert_container(
        &mut self,
        parent: ContextId,
        key: ContainerKey,
        filter: ContainerFilter,
    ) -> Result<ContextId> {
        if matches!(self.node(parent)?.kind, ContextKind::Container(_)) {
            return Err(EnroError::WrongContextKind {
                context: parent,
                expected: "root or destination",
            });
        }
        if self.containers.contains_key(&key) {
            return Err(EnroError::DuplicateContainer(key));
        }

        let id = self.allocate();
        self.containers.insert(key.clone(), id);
        self.nodes.insert(
            id,
            ContextNode {
                id,
                parent: Some(parent),
                children: Vec::new(),
                active_child: None,
                kind: ContextKind::Container(ContainerContext {
                    key,
                    filter,
                    backstack: Vec::new(),
                    interceptors: Vec::new(),
                }),
            },
        );
        let parent_node = self.node_mut(parent)?;
        parent_node.children.push(id);
        if parent_node.active_child.is_none() {
            parent_node.active_child = Some(id);
        }
        Ok(id)
    }

    pub(crate) fn insert_destination(
        &mut self,
        container: ContextId,
        instance: NavigationKeyInstance,
        lifecycle: Lifecycle,
    ) -> Result<ContextId> {
        self.container(container)?;
        if self.destinations.contains_key(&instance.id) {
            return Err(EnroError::DuplicateInstance {
                instance: instance.id,
            });
        }

        let id = self.allocate();
        self.destinations.insert(instance.id, id);
        self.nodes.insert(
            id,
            ContextNode {
                id,
                parent: Some(container),
                children: Vec::new(),
                active_child: None,
                kind: ContextKind::Destination(DestinationContext {
                    instance,
                    lifecycle,
                }),
            },
        );
        self.node_mut(container)?.children.push(id);
        Ok(id)
    }

    /// Detach `id` from its parent and remove it with all descendants.
    ///
    /// Removed nodes are returned deepest first, so destinations are torn
    /// down before the containers that held them.
    pub(crate) fn remove_subtree(&mut self, id: ContextId) -> Vec<ContextNode> {
        if let Some(parent) = self.nodes.get(&id).and_then(|n| n.parent) {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|c| *c != id);
                if parent_node.active_child == Some(id) {
                    parent_node.active_child = None;
                }
            }
        }
        self.roots.retain(|r| *r != id);

        let mut removed = Vec::new();
        self.remove_recursive(id, &mut removed);
        removed
    }

    fn remove_recursive(&mut self, id: ContextId, removed: &mut Vec<ContextNode>) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for child in node.children.iter().rev() {
            self.remove_recursive(*child, removed);
        }
        match &node.kind {
            ContextKind::Container(container) => {
                self.containers.remove(&container.key);
            }
            ContextKind::Destination(destination) => {
                self.destinations.remove(&destination.instance.id);
            }
            ContextKind::Root(_) => {}
        }
        removed.push(node);
    }

    // --- lookups ---

    pub fn get(&self, id: ContextId) -> Option<&ContextNode> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: ContextId) -> Result<&ContextNode> {
        self.nodes.get(&id).ok_or(EnroError::ContextNotFound(id))
    }

    pub(crate) fn node_mut(&mut self, id: ContextId) -> Result<&mut ContextNode> {
        self.nodes.get_mut(&id).ok_or(EnroError::ContextNotFound(id))
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[ContextId] {
        &self.roots
    }

    pub fn parent(&self, id: ContextId) -> Option<ContextId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ContextId) -> &[ContextId] {
        self.nodes.get(&id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn active_child(&self, id: ContextId) -> Option<ContextId> {
        self.nodes.get(&id).and_then(|n| n.active_child)
    }

    pub(crate) fn set_active_child(
        &mut self,
        parent: ContextId,
        child: Option<ContextId>,
    ) -> Result<()> {
        let node = self.node_mut(parent)?;
        if let Some(child) = child {
            if !node.children.contains(&child) {
                return Err(EnroError::NotAChild { parent, child });
            }
        }
        node.active_child = child;
        Ok(())
    }

    pub(crate) fn reorder_children(
        &mut self,
        parent: ContextId,
        children: Vec<ContextId>,
    ) -> Result<()> {
        self.node_mut(parent)?.children = children;
        Ok(())
    }

    pub fn root_of(&self, id: ContextId) -> Option<ContextId> {
        let mut cursor = id;
        loop {
            let node = self.nodes.get(&cursor)?;
            match node.parent {
                Some(parent) => cursor = parent,
                None => return Some(cursor),
            }
        }
    }

    pub fn root(&self, id: ContextId) -> Result<&RootContext> {
        match &self.node(id)?.kind {
            ContextKind::Root(root) => Ok(root),
            _ => Err(EnroError::WrongContextKind {
                context: id,
                expected: "root",
            }),
        }
    }

    pub fn container(&self, id: ContextId) -> Result<&ContainerContext> {
        self.node(id)?
            .as_container()
            .ok_or(EnroError::WrongContextKind {
                context: id,
                expected: "container",
            })
    }

    pub(crate) fn container_mut(&mut self, id: ContextId) -> Result<&mut ContainerContext> {
        match &mut self.node_mut(id)?.kind {
            ContextKind::Container(container) => Ok(container),
            _ => Err(EnroError::WrongContextKind {
                context: id,
                expected: "container",
            }),
        }
    }

    pub fn destination(&self, id: ContextId) -> Result<&DestinationContext> {
        self.node(id)?
            .as_destination()
            .ok_or(EnroError::WrongContextKind {
                context: id,
                expected: "destination",
            })
    }

    pub(crate) fn destination_mut(&mut self, id: ContextId) -> Result<&mut DestinationContext> {
        match &mut self.node_mut(id)?.kind {
            ContextKind::Destination(destination) => Ok(destination),
            _ => Err(EnroError::WrongContextKind {
                context: id,
                expected: "destination",
            }),
        }
    }

    pub fn find_container(&self, key: &ContainerKey) -> Option<ContextId> {
        self.containers.get(key).copied()
    }

    pub fn destination_for(&self, instance: InstanceId) -> Option<ContextId> {
        self.destinations.get(&instance).copied()
    }

    pub fn container_holding(&self, instance: InstanceId) -> Option<ContextId> {
        self.destination_for(instance).and_then(|d| self.parent(d))
    }

    pub fn contains_instance(&self, instance: InstanceId) -> bool {
        self.destinations.contains_key(&instance)
    }

    pub fn instance(&self, instance: InstanceId) -> Option<&NavigationKeyInstance> {
        self.destination_for(instance)
            .and_then(|id| self.nodes.get(&id))
            .and_then(|n| n.as_destination())
            .map(|d| &d.instance)
    }

    // --- active state ---

    /// Nodes on the path of active children starting at `root` (inclusive).
    pub fn active_path(&self, root: ContextId) -> Vec<ContextId> {
        let mut path = Vec::new();
        let mut cursor = Some(root);
        while let Some(id) = cursor {
            if !self.nodes.contains_key(&id) {
                break;
            }
            path.push(id);
            cursor = self.active_child(id);
        }
        path
    }

    /// The deepest destination on the active path of `root`.
    pub fn active_leaf(&self, root: ContextId) -> Option<ContextId> {
        self.active_path(root)
            .into_iter()
            .rev()
            .find(|id| self.nodes.get(id).and_then(|n| n.as_destination()).is_some())
    }

    /// Whether `id` is the terminal destination of the active path of its root.
    ///
    /// Computed on demand by walking up to the root, so rearranging
    /// containers can never leave a stale flag behind.
    pub fn is_active_in_root(&self, id: ContextId) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        if node.as_destination().is_none() {
            return false;
        }

        let mut child = id;
        let mut cursor = node.parent;
        while let Some(parent) = cursor {
            let Some(parent_node) = self.nodes.get(&parent) else {
                return false;
            };
            if parent_node.active_child != Some(child) {
                return false;
            }
            child = parent;
            cursor = parent_node.parent;
        }
        if !matches!(
            self.nodes.get(&child).map(|n| &n.kind),
            Some(ContextKind::Root(_))
        ) {
            return false;
        }

        let mut below = node.active_child;
        while let Some(next) = below {
            match self.nodes.get(&next) {
                Some(n) if n.as_destination().is_some() => return false,
                Some(n) => below = n.active_child,
                None => break,
            }
        }
        true
    }

    /// Whether `id` is a destination on top of its container, with every
    /// destination above it also on top of its own container.
    pub fn is_visible(&self, id: ContextId) -> bool {
        let mut cursor = id;
        loop {
            let Some(destination) = self.nodes.get(&cursor).and_then(|n| n.as_destination()) else {
                return false;
            };
            let Some(container_id) = self.parent(cursor) else {
                return false;
            };
            let on_top = self
                .container(container_id)
                .ok()
                .and_then(|c| c.top())
                .is_some_and(|top| top.id == destination.instance.id);
            if !on_top {
                return false;
            }
            match self.parent(container_id) {
                Some(above)
                    if matches!(
                        self.nodes.get(&above).map(|n| &n.kind),
                        Some(ContextKind::Root(_))
                    ) =>
                {
                    return true;
                }
                Some(above) => cursor = above,
                None => return false,
            }
        }
    }

    /// Pick the container an open from `from` should execute in.
    ///
    /// From a destination: its active child container, then its parent
    /// container and the containers above it. From a container: itself,
    /// then the containers above it. From a root: its active container.
    /// The first container whose filter accepts `key_type` wins; with
    /// `fallback` the nearest candidate is used when none accepts.
    pub fn find_container_for(
        &self,
        from: ContextId,
        key_type: &str,
        fallback: bool,
    ) -> Option<ContextId> {
        let node = self.nodes.get(&from)?;
        let mut candidates = Vec::new();
        match node.kind {
            ContextKind::Root(_) => candidates.extend(node.active_child),
            ContextKind::Destination(_) => {
                candidates.extend(node.active_child);
                candidates.extend(self.ancestor_containers(from));
            }
            ContextKind::Container(_) => {
                candidates.push(from);
                candidates.extend(self.ancestor_containers(from));
            }
        }

        candidates
            .iter()
            .copied()
            .find(|c| {
                self.container(*c)
                    .map(|container| container.filter.accepts(key_type))
                    .unwrap_or(false)
            })
            .or_else(|| if fallback { candidates.first().copied() } else { None })
    }

    fn ancestor_containers(&self, id: ContextId) -> Vec<ContextId> {
        let mut found = Vec::new();
        let mut cursor = self.parent(id);
        while let Some(current) = cursor {
            if self.container(current).is_ok() {
                found.push(current);
            }
            cursor = self.parent(current);
        }
        found
    }

    // --- traversal / diagnostics ---

    fn walk_pre_order<F>(&self, from: ContextId, depth: usize, visit: &mut F)
    where
        F: FnMut(&ContextNode, usize),
    {
        let Some(node) = self.nodes.get(&from) else {
            return;
        };
        visit(node, depth);
        for child in &node.children {
            self.walk_pre_order(*child, depth + 1, visit);
        }
    }

    /// Every container in the subtree rooted at `from`, in pre-order.
    pub fn find_all_containers(&self, from: ContextId) -> Vec<ContextId> {
        let mut found = Vec::new();
        self.walk_pre_order(from, 0, &mut |node, _| {
            if node.as_container().is_some() {
                found.push(node.id);
            }
        });
        found
    }

    /// Every destination in the subtree rooted at `from`, in pre-order.
    pub fn find_all_destinations(&self, from: ContextId) -> Vec<ContextId> {
        let mut found = Vec::new();
        self.walk_pre_order(from, 0, &mut |node, _| {
            if node.as_destination().is_some() {
                found.push(node.id);
            }
        });
        found
    }

    /// Indented rendering of the subtree rooted at `from`; nodes that are
    /// their parent's active child are marked `[active]`.
    pub fn get_debug_string(&self, from: ContextId) -> String {
        let mut out = String::new();
        self.walk_pre_order(from, 0, &mut |node, depth| {
            let active = node
                .parent
                .and_then(|p| self.active_child(p))
                .is_some_and(|a| a == node.id);
            out.push_str(&"  ".repeat(depth));
            out.push_str(&node.debug_label());
            if active {
                out.push_str(" [active]");
            }
            out.push('\n');
        });
        out
    }
}
