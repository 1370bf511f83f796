//! Navigation key instances: a key plus a unique id plus metadata.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::key::{AnyKey, NavigationDirection, NavigationKey, SupportsPresent, SupportsPush};
use crate::Result;

/// Globally unique id of a navigation key instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// First eight hex characters, used in debug output.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tree-unique name of a container context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerKey(String);

impl ContainerKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContainerKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for ContainerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation token linking an opened instance to the channel awaiting its result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultId {
    /// Instance id of the destination that owns the channel.
    pub owner: InstanceId,
    pub result_id: String,
}

impl ResultId {
    pub fn new(owner: InstanceId, result_id: impl Into<String>) -> Self {
        Self {
            owner,
            result_id: result_id.into(),
        }
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner.short(), self.result_id)
    }
}

/// Metadata carried by an instance.
///
/// The core only ever reads a small fixed set of entries, so they are plain
/// fields. `extras` holds anything user interceptors want to stamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<ResultId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previously_active_container: Option<ContainerKey>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub opened_in_root: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl InstanceMetadata {
    pub fn set_extra(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.extras.insert(key.into(), value);
    }

    pub fn extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extras.get(key)
    }
}

/// A navigation key plus a unique id plus mutable metadata; the addressable
/// unit of backstack membership.
///
/// Two instances of equal keys are distinct entries. Compare with
/// [`same_instance`](Self::same_instance) when identity is what matters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationKeyInstance {
    pub id: InstanceId,
    pub key: AnyKey,
    pub direction: NavigationDirection,
    #[serde(default)]
    pub metadata: InstanceMetadata,
}

impl NavigationKeyInstance {
    pub fn push<K: SupportsPush>(key: &K) -> Result<Self> {
        Ok(Self::from_any(AnyKey::from_key(key)?, NavigationDirection::Push))
    }

    pub fn present<K: SupportsPresent>(key: &K) -> Result<Self> {
        Ok(Self::from_any(
            AnyKey::from_key(key)?,
            NavigationDirection::Present,
        ))
    }

    /// Build an instance from an already-erased key with a fresh id.
    pub fn from_any(key: AnyKey, direction: NavigationDirection) -> Self {
        Self {
            id: InstanceId::new(),
            key,
            direction,
            metadata: InstanceMetadata::default(),
        }
    }

    pub fn key_type(&self) -> &str {
        &self.key.key_type
    }

    pub fn key<K: NavigationKey>(&self) -> Result<K> {
        self.key.decode()
    }

    pub fn same_instance(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
