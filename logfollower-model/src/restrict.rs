use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Which of `collections` the restrict policy names.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
pub enum RestrictMode {
    #[default]
    None,
    Include,
    Exclude,
}

/// Which collections the follower replicates: `mode` selects between
/// include-list, exclude-list, or no restriction at all, and
/// `include_system` governs system collections separately.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RestrictPolicy {
    pub mode: RestrictMode,
    pub collections: BTreeSet<String>,
    pub include_system: bool,
}

impl RestrictPolicy {
    pub fn none(include_system: bool) -> RestrictPolicy {
        RestrictPolicy {
            mode: RestrictMode::None,
            collections: BTreeSet::new(),
            include_system,
        }
    }
}
