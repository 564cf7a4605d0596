#[cfg(not(target_arch = "wasm32"))]
pub use std::time::{Duration, Instant};

#[cfg(target_arch = "wasm32")]
pub use web_time::{Duration, Instant};

use std::fmt;
use std::hash::{Hash, Hasher};

/// A sample on the scene timeline.
///
/// Consolidations are cached per time sample, so the type is hashable.
/// Equality and hashing go through the bit pattern with `-0.0` folded
/// into `0.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeCode(f64);

impl TimeCode {
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    fn key(self) -> u64 {
        if self.0 == 0.0 { 0 } else { self.0.to_bits() }
    }
}

impl PartialEq for TimeCode {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TimeCode {}

impl Hash for TimeCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl From<f64> for TimeCode {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}
