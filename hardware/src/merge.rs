// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Additive merge helpers.
//!
//! Everything discovered about a machine is assembled from several partial
//! views. The same rule applies whenever two views of one entity meet:
//!
//! * a scalar field is written once, and only while it is still unset;
//! * a set-valued field only ever grows.
//!
//! [`fill_unset`] and [`union`] implement the two halves of that rule.

use std::collections::BTreeSet;

/// A value with a distinguished "not yet known" state.
pub trait Unset {
    /// Returns true if no meaningful value has been recorded yet.
    fn is_unset(&self) -> bool;
}

impl<T> Unset for Option<T> {
    fn is_unset(&self) -> bool {
        self.is_none()
    }
}

impl Unset for String {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl Unset for f64 {
    fn is_unset(&self) -> bool {
        *self == 0.0
    }
}

/// Stores `incoming` in `current` if `current` is unset.
///
/// Returns true if `current` was written.
pub fn fill_unset<T: Unset>(current: &mut T, incoming: T) -> bool {
    if current.is_unset() && !incoming.is_unset() {
        *current = incoming;
        return true;
    }
    false
}

/// Adds every element of `incoming` to `current`.
pub fn union<T: Ord>(current: &mut BTreeSet<T>, incoming: impl IntoIterator<Item = T>) {
    current.extend(incoming);
}
