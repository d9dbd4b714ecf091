use logfollower_model::{Event, RestrictMode, RestrictPolicy};

/// The user-function collection and the replication-metadata
/// collection are always replicated regardless of `includeSystem`:
/// the former so user-defined functions stay in sync, the latter so
/// `logfollower status` can read progress off a replica.
const ALWAYS_INCLUDED_SYSTEM_COLLECTIONS: &[&str] = &["_functions", "_replication_applier_state"];

/// Decides whether an event should be applied, based on the
/// `RestrictPolicy` and the system-collection policy.
///
/// Kept as two functions — `is_restricted` (pure include/exclude-list
/// lookup) and `should_skip` (the full per-marker decision) — mirroring
/// the original syncer's separation between `excludeCollection` and
/// `skipMarker`.
pub struct CollectionFilter {
    policy: RestrictPolicy,
}

impl CollectionFilter {
    pub fn new(policy: RestrictPolicy) -> CollectionFilter {
        CollectionFilter { policy }
    }

    /// Whether `name` is excluded purely by the include/exclude list,
    /// ignoring the system-collection policy.
    pub fn is_restricted(&self, name: &str) -> bool {
        match self.policy.mode {
            RestrictMode::None => false,
            RestrictMode::Include => !self.policy.collections.contains(name),
            RestrictMode::Exclude => self.policy.collections.contains(name),
        }
    }

    fn is_always_included(name: &str) -> bool {
        ALWAYS_INCLUDED_SYSTEM_COLLECTIONS.contains(&name)
    }

    /// The full per-marker skip decision. Events with no collection
    /// (tx fences) are never skipped here.
    pub fn should_skip(&self, event: &Event) -> bool {
        let Some(name) = event.collection_name() else {
            return false;
        };
        let is_system = name.starts_with('_');
        if is_system && !self.policy.include_system && !Self::is_always_included(name) {
            return true;
        }
        self.is_restricted(name)
    }
}
