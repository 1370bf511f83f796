//! Navigation bindings and the binding registry.
//!
//! A binding tells the core how a key type is hosted: as a normal destination
//! inside a container, in a brand new platform root, or as a synthetic
//! destination that only runs a block and never becomes a context node.

use std::collections::HashMap;
use std::fmt;

use enro_types::{EnroError, NavigationKey, Result};

use crate::interceptors::synthetic::{SyntheticDestination, SyntheticScope};

// ---------------------------------------------------------------------------
// NavigationBinding
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum BindingHost {
    /// Rendered as a destination inside a container.
    Container,
    /// Needs its own platform-level host (window, activity, tab).
    Root,
    Synthetic(SyntheticDestination),
}

impl BindingHost {
    pub fn name(&self) -> &'static str {
        match self {
            BindingHost::Container => "container",
            BindingHost::Root => "root",
            BindingHost::Synthetic(_) => "synthetic",
        }
    }
}

impl fmt::Debug for BindingHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct NavigationBinding {
    pub key_type: String,
    pub host: BindingHost,
}

impl NavigationBinding {
    pub fn destination<K: NavigationKey>() -> Self {
        Self::dynamic(K::KEY_TYPE, BindingHost::Container)
    }

    pub fn root<K: NavigationKey>() -> Self {
        Self::dynamic(K::KEY_TYPE, BindingHost::Root)
    }

    pub fn synthetic<K, F>(block: F) -> Self
    where
        K: NavigationKey,
        F: Fn(&mut SyntheticScope<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self::dynamic(K::KEY_TYPE, BindingHost::Synthetic(SyntheticDestination::new(block)))
    }

    /// Binding for a key type known only at runtime.
    pub fn dynamic(key_type: impl Into<String>, host: BindingHost) -> Self {
        Self {
            key_type: key_type.into(),
            host,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.host, BindingHost::Root)
    }

    pub fn synthetic_destination(&self) -> Option<&SyntheticDestination> {
        match &self.host {
            BindingHost::Synthetic(destination) => Some(destination),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// BindingRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct BindingRegistry {
    bindings: HashMap<String, NavigationBinding>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding. A second binding for the same key type is a
    /// configuration defect.
    pub fn register(&mut self, binding: NavigationBinding) -> Result<()> {
        if self.bindings.contains_key(&binding.key_type) {
            return Err(EnroError::DuplicateBinding {
                key_type: binding.key_type,
            });
        }
        self.bindings.insert(binding.key_type.clone(), binding);
        Ok(())
    }

    pub fn get(&self, key_type: &str) -> Option<&NavigationBinding> {
        self.bindings.get(key_type)
    }

    /// Like [`get`](Self::get), but a missing binding is an error naming the key type.
    pub fn require(&self, key_type: &str) -> Result<&NavigationBinding> {
        self.get(key_type).ok_or_else(|| EnroError::MissingBinding {
            key_type: key_type.to_string(),
        })
    }

    pub fn has(&self, key_type: &str) -> bool {
        self.bindings.contains_key(key_type)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
