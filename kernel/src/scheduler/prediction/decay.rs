//! UNIX-style CPU usage decay
//!
//! After every run segment each live thread folds its last burst into a
//! decayed CPU estimate: `cpu = (cpu + burst) / cpu_divisor`, and its dynamic
//! priority becomes `base + cpu / priority_divisor`. Larger is worse.

/// Default damping constant for both divisions
pub const DEFAULT_DECAY_DIVISOR: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecayParams {
    pub cpu_divisor: u64,
    pub priority_divisor: u64,
}

impl DecayParams {
    pub const fn new(cpu_divisor: u64, priority_divisor: u64) -> Self {
        Self {
            cpu_divisor,
            priority_divisor,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.cpu_divisor > 0 && self.priority_divisor > 0
    }

    /// Fold `last_burst` into the CPU estimate
    pub fn fold(&self, cpu_count: u64, last_burst: u64) -> u64 {
        cpu_count.saturating_add(last_burst) / self.cpu_divisor
    }

    /// Dynamic priority for a CPU estimate
    pub fn priority(&self, base: u64, cpu_count: u64) -> u64 {
        base.saturating_add(cpu_count / self.priority_divisor)
    }
}

impl Default for DecayParams {
    fn default() -> Self {
        Self::new(DEFAULT_DECAY_DIVISOR, DEFAULT_DECAY_DIVISOR)
    }
}
