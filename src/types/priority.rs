use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

// Framework 0 (highest) … 10 (lowest) → backend +10 … −10 in steps of 2.
static DEFAULT_ENTRIES: Lazy<HashMap<i32, i32>> =
    Lazy::new(|| (0..=10).map(|n| (n, 10 - 2 * n)).collect());

/// Maps framework-native priorities onto the backend's scale.
///
/// Values absent from the table pass through unchanged, the escape hatch
/// for non-standard scales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityMap {
    entries: HashMap<i32, i32>,
}

impl Default for PriorityMap {
    fn default() -> Self {
        Self { entries: DEFAULT_ENTRIES.clone() }
    }
}

impl PriorityMap {
    pub fn new(entries: HashMap<i32, i32>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Map a native priority. `None` means no priority was requested.
    pub fn resolve(&self, native: Option<i32>) -> Option<i32> {
        let native = native?;
        Some(self.entries.get(&native).copied().unwrap_or(native))
    }

    pub fn set(&mut self, native: i32, backend: i32) {
        self.entries.insert(native, backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_spans_the_framework_scale() {
        let map = PriorityMap::default();
        assert_eq!(map.resolve(Some(0)), Some(10));
        assert_eq!(map.resolve(Some(5)), Some(0));
        assert_eq!(map.resolve(Some(10)), Some(-10));
    }

    #[test]
    fn none_passes_through_as_none() {
        assert_eq!(PriorityMap::default().resolve(None), None);
    }

    #[test]
    fn unmapped_values_pass_through_verbatim() {
        assert_eq!(PriorityMap::default().resolve(Some(99)), Some(99));
        assert_eq!(PriorityMap::default().resolve(Some(-3)), Some(-3));
    }

    #[test]
    fn custom_entries_override_the_table() {
        let mut map = PriorityMap::default();
        map.set(0, 42);
        assert_eq!(map.resolve(Some(0)), Some(42));
        assert_eq!(map.resolve(Some(1)), Some(8));
    }
}
