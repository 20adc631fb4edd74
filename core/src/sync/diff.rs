//! Sorted membership merge
//!
//! Reconciles a view's previous membership against a freshly queried one
//! with a single linear pass. Both sequences must be sorted ascending by
//! primary key; keys are unique, so ties are impossible. The merge treats
//! the old sequence as a FIFO queue and emits the change-set in one scan,
//! O(|old| + |new|).

/// Minimal change-set between two sorted membership snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    /// Keys to add, in the order the new membership yields them
    pub added: Vec<i64>,

    /// Keys to remove from the old membership
    pub removed: Vec<i64>,
}

impl MembershipDelta {
    /// Whether the merge found no changes
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Merge two ascending key sequences into the minimal change-set.
///
/// Equal keys keep their existing identity and produce no change. Keys
/// only in `new` are added; keys only in `old` are removed. Applying the
/// removals and then the additions to the old membership yields exactly
/// the new membership.
pub fn merge_sorted(old: &[i64], new: &[i64]) -> MembershipDelta {
    let mut delta = MembershipDelta::default();
    let mut front = 0usize;

    for &key in new {
        if front == old.len() || key < old[front] {
            delta.added.push(key);
        } else if key > old[front] {
            delta.removed.push(old[front]);
            front += 1;
            delta.added.push(key);
        } else {
            front += 1;
        }
    }
    delta.removed.extend_from_slice(&old[front..]);

    delta
}
