//! Navigation keys and their capability markers.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{EnroError, Result};

/// A value describing "what to show".
///
/// `KEY_TYPE` is the stable name bindings are registered under. It must be
/// unique per key type within one controller.
pub trait NavigationKey:
    Serialize + DeserializeOwned + fmt::Debug + Clone + PartialEq + Send + Sync + 'static
{
    const KEY_TYPE: &'static str;
}

/// Marker for keys that may be pushed onto a backstack.
pub trait SupportsPush: NavigationKey {}

/// Marker for keys that may be presented over the current destination.
pub trait SupportsPresent: NavigationKey {}

/// Marker for keys whose destination completes with a typed result.
pub trait WithResult: NavigationKey {
    type Result: Serialize + DeserializeOwned + Send + 'static;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationDirection {
    Push,
    Present,
}

/// A type-erased navigation key.
///
/// Typed keys are erased through `serde_json` so that instances stay
/// serializable end to end, and so that keys defined at runtime (scripts,
/// hosts) can flow through the same pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyKey {
    pub key_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl AnyKey {
    pub fn new(key_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            key_type: key_type.into(),
            payload,
        }
    }

    /// Erase a typed key.
    pub fn from_key<K: NavigationKey>(key: &K) -> Result<Self> {
        Ok(Self {
            key_type: K::KEY_TYPE.to_string(),
            payload: serde_json::to_value(key)?,
        })
    }

    pub fn is<K: NavigationKey>(&self) -> bool {
        self.key_type == K::KEY_TYPE
    }

    /// Recover the typed key. Fails if the key type does not match.
    pub fn decode<K: NavigationKey>(&self) -> Result<K> {
        if !self.is::<K>() {
            return Err(EnroError::KeyTypeMismatch {
                expected: K::KEY_TYPE.to_string(),
                actual: self.key_type.clone(),
            });
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}
