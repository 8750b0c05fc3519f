//! Immutable vector clocks and causal comparison.

use crate::error::{ClockError, ClockResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The causal relationship between two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// The left clock is causally before the right.
    Before,
    /// The left clock is causally after the right.
    After,
    /// Neither clock dominates the other.
    Concurrent,
    /// Both clocks are identical.
    Equal,
}

impl ClockOrdering {
    /// Returns the ordering with left and right swapped.
    pub fn reversed(&self) -> Self {
        match self {
            ClockOrdering::Before => ClockOrdering::After,
            ClockOrdering::After => ClockOrdering::Before,
            ClockOrdering::Concurrent => ClockOrdering::Concurrent,
            ClockOrdering::Equal => ClockOrdering::Equal,
        }
    }
}

/// A vector clock: a map from device id to a non-negative counter.
///
/// An absent device reads as counter 0. The clock is immutable; every
/// mutating operation returns a new instance, so clocks can be shared
/// across threads without coordination.
///
/// The backing map is a `BTreeMap`, which keeps device ids sorted and
/// makes the serialized form canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    /// Creates an empty clock (all counters implicitly 0).
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates a clock for a device's first write: `{device_id: 1}`.
    pub fn for_device(device_id: impl Into<String>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(device_id.into(), 1);
        Self(entries)
    }

    /// Returns the counter for a device (0 if absent).
    pub fn get(&self, device_id: &str) -> u64 {
        self.0.get(device_id).copied().unwrap_or(0)
    }

    /// Returns a new clock with the device's counter incremented by one.
    ///
    /// The input clock is unchanged.
    pub fn increment(&self, device_id: &str) -> Self {
        let mut entries = self.0.clone();
        let counter = entries.entry(device_id.to_string()).or_insert(0);
        *counter += 1;
        Self(entries)
    }

    /// Returns the element-wise maximum over the union of device ids.
    pub fn merge(&self, other: &Self) -> Self {
        let mut entries = self.0.clone();
        for (device_id, &counter) in &other.0 {
            let existing = entries.entry(device_id.clone()).or_insert(0);
            *existing = (*existing).max(counter);
        }
        Self(entries)
    }

    /// Compares two clocks under the causal partial order.
    ///
    /// Every device id present in either clock is considered, with
    /// missing entries reading as 0. If each side strictly exceeds the
    /// other somewhere the clocks are `Concurrent`; if only one does it
    /// is `After` (or the other is, making this one `Before`); if
    /// neither does they are `Equal`.
    pub fn compare(&self, other: &Self) -> ClockOrdering {
        let mut self_greater = false;
        let mut other_greater = false;

        for device_id in self.0.keys().chain(other.0.keys()) {
            let ours = self.get(device_id);
            let theirs = other.get(device_id);
            if ours > theirs {
                self_greater = true;
            } else if theirs > ours {
                other_greater = true;
            }
        }

        match (self_greater, other_greater) {
            (true, true) => ClockOrdering::Concurrent,
            (true, false) => ClockOrdering::After,
            (false, true) => ClockOrdering::Before,
            (false, false) => ClockOrdering::Equal,
        }
    }

    /// Returns true if this clock is causally before the other.
    pub fn happens_before(&self, other: &Self) -> bool {
        self.compare(other) == ClockOrdering::Before
    }

    /// Returns true if neither clock dominates the other.
    pub fn concurrent_with(&self, other: &Self) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    /// Returns true if this clock is equal to or after the other.
    pub fn dominates(&self, other: &Self) -> bool {
        matches!(
            self.compare(other),
            ClockOrdering::After | ClockOrdering::Equal
        )
    }

    /// Validates the clock's entries.
    ///
    /// Fails when any device id is empty. Counters are `u64`, so
    /// negative or fractional values are unrepresentable; they are
    /// rejected at parse time instead of being coerced.
    pub fn validate(&self) -> ClockResult<()> {
        if self.0.keys().any(|device_id| device_id.is_empty()) {
            return Err(ClockError::EmptyDeviceId);
        }
        Ok(())
    }

    /// Iterates over (device id, counter) entries in sorted order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(device_id, &counter)| (device_id.as_str(), counter))
    }

    /// Returns the number of devices with an explicit entry.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no device has an explicit entry.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VectorClock {
    /// Canonical serialization: JSON object with sorted device ids.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let serialized = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&serialized)
    }
}

impl FromStr for VectorClock {
    type Err = ClockError;

    /// Parses the canonical form produced by `Display`.
    ///
    /// Rejects negative and non-integer counters and empty device ids.
    fn from_str(s: &str) -> ClockResult<Self> {
        let entries: BTreeMap<String, u64> =
            serde_json::from_str(s).map_err(|e| ClockError::Parse(e.to_string()))?;
        let clock = Self(entries);
        clock.validate()?;
        Ok(clock)
    }
}

impl FromIterator<(String, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
