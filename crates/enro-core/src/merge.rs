//! Backstack merge: reconcile an old ordered backstack with a new one.
//!
//! Elements present in both lists take the new list's relative order.
//! Elements only in the old list are re-inserted right after the surviving
//! element with the highest new index seen before them, so removed entries
//! stay next to their neighbours instead of drifting to either end. Teardown
//! ordering and transition diffing both depend on this being deterministic.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use enro_types::{InstanceId, NavigationKeyInstance};

/// Merge `old` into `new`, comparing elements by `identity`.
///
/// Buckets are keyed by the running high-water mark of new-list indices
/// while walking `old`. Bucket `-1` collects removed elements that precede
/// every survivor. Each bucket `i >= 0` emits `new[i]` first, then the
/// removed old elements that were attached to it.
pub fn merge<T, K, F>(old: &[T], new: &[T], identity: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let new_index: HashMap<K, usize> = new
        .iter()
        .enumerate()
        .map(|(i, item)| (identity(item), i))
        .collect();

    let mut buckets: BTreeMap<isize, Vec<T>> = BTreeMap::new();
    for (i, item) in new.iter().enumerate() {
        buckets.entry(i as isize).or_default().push(item.clone());
    }

    let mut high_water: isize = -1;
    for item in old {
        match new_index.get(&identity(item)) {
            Some(&i) => high_water = high_water.max(i as isize),
            None => buckets.entry(high_water).or_default().push(item.clone()),
        }
    }

    buckets.into_values().flatten().collect()
}

/// [`merge`] for backstacks, by instance id.
pub fn merge_instances(
    old: &[NavigationKeyInstance],
    new: &[NavigationKeyInstance],
) -> Vec<NavigationKeyInstance> {
    merge(old, new, |instance| instance.id)
}

/// Ids of `merged` entries that are absent from `new`, in merged order.
pub fn removed_in_order(
    merged: &[NavigationKeyInstance],
    new: &[NavigationKeyInstance],
) -> Vec<InstanceId> {
    merged
        .iter()
        .filter(|m| !new.iter().any(|n| n.id == m.id))
        .map(|m| m.id)
        .collect()
}
