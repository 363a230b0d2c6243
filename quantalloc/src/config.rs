//! Pool tuning knobs

/// Default lower bound, in quanta, for a block carved from the pool.
///
/// With 8-byte quanta this carves at least 128 bytes at a time.
pub const DEFAULT_MIN_CARVE_QUANTA: u32 = 16;

/// Configuration of a [`Pool`](crate::Pool)
///
/// Small carves fragment the pool when many tiny blocks are allocated and
/// freed. Raising the minimum helps workloads made of large allocations,
/// lowering it conserves memory for workloads made of small ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    min_carve_quanta: u32,
}

impl PoolConfig {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            min_carve_quanta: DEFAULT_MIN_CARVE_QUANTA,
        }
    }

    /// Set the minimum number of quanta carved from the pool at once.
    ///
    /// A value of zero is treated as one.
    #[must_use]
    #[inline]
    pub const fn with_min_carve_quanta(mut self, quanta: u32) -> Self {
        self.min_carve_quanta = if quanta == 0 { 1 } else { quanta };
        self
    }

    #[must_use]
    #[inline]
    pub const fn min_carve_quanta(&self) -> u32 {
        self.min_carve_quanta
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}
