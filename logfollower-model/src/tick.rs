use serde::{Deserialize, Serialize};

/// A monotonically increasing identifier assigned by the master to every
/// mutation. Totally ordered; gaps are permitted; ticks are never reused.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn next(self) -> Tick {
        Tick(self.0 + 1)
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Tick {
    fn from(v: u64) -> Tick {
        Tick(v)
    }
}
