//! Parameter sets and the fixed slot layout
//!
//! The layout is a wire contract shared by the client packing code, the
//! statistics engine and the report decoder. Every component derives its slot
//! positions from [`SlotLayout`] rather than hard-coding offsets.

use serde::{Deserialize, Serialize};

/// Largest ring degree the default modulus chain is secure for.
pub const MAX_SECURE_RING_DIM: usize = 8192;

/// Core parameters of a batched scheme instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeParams {
    /// Number of slots per ciphertext (half the ring degree)
    /// Observed deployments use 4096.
    pub slot_count: usize,

    /// Fixed-point scale in bits applied when encoding reals
    pub scale_bits: u32,

    /// Multiplicative depth available before the noise budget is spent
    pub max_depth: u32,

    /// Standard deviation of the discrete Gaussian noise
    pub sigma: f64,
}

impl SchemeParams {
    /// 4096 slots over a degree-8192 ring with a four-prime modulus chain
    pub fn slots_4096() -> Self {
        Self {
            slot_count: 4096,
            scale_bits: 40,
            max_depth: 4,
            sigma: 3.2,
        }
    }

    /// Small instance for tests and local experiments.
    pub fn slots_256() -> Self {
        Self {
            slot_count: 256,
            ..Self::slots_4096()
        }
    }

    /// Ring degree N = 2 · slot_count
    pub fn ring_dim(&self) -> usize {
        2 * self.slot_count
    }

    /// Fixed-point scale Δ = 2^scale_bits
    pub fn scale(&self) -> f64 {
        (self.scale_bits as f64).exp2()
    }

    /// Slot layout derived from these parameters
    pub fn layout(&self) -> SlotLayout {
        SlotLayout::new(self.slot_count)
    }

    /// Check if parameters are valid
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.slot_count.is_power_of_two() {
            return Err("slot_count must be a power of two");
        }

        // Lanes are split in halves and the engine needs at least two samples
        if self.slot_count < 8 {
            return Err("slot_count must be at least 8");
        }

        if self.ring_dim() > MAX_SECURE_RING_DIM {
            return Err("insecure parameters: ring degree exceeds 8192");
        }

        if self.max_depth == 0 {
            return Err("max_depth must be positive");
        }

        if !(self.sigma > 0.0) {
            return Err("sigma must be positive");
        }

        Ok(())
    }
}

impl Default for SchemeParams {
    fn default() -> Self {
        Self::slots_4096()
    }
}

/// Two-lane view of a slot vector
///
/// Lane 0 is `[0, half)` and lane 1 is `[half, slot_count)`. Slot `i` of
/// lane 1 is paired with slot `i` of lane 0.
///
/// | Output   | Lane 0                                         | Lane 1                 |
/// |----------|------------------------------------------------|------------------------|
/// | position | x per sample                                   | y per sample           |
/// | time     | z per sample                                   | timestamp per sample   |
/// | stats    | squared displacement in `[0, half-1)`, total time at `half-1` | total distance in masked buckets |
/// | summary  | total time in masked buckets                   | total distance in masked buckets |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLayout {
    slot_count: usize,
}

impl SlotLayout {
    pub fn new(slot_count: usize) -> Self {
        Self { slot_count }
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Width of one lane
    pub fn half(&self) -> usize {
        self.slot_count / 2
    }

    /// Maximum number of samples a run can carry
    pub fn max_samples(&self) -> usize {
        self.half()
    }

    /// Slot of the stats output holding the elapsed time
    pub fn total_time_slot(&self) -> usize {
        self.half() - 1
    }

    /// Number of displacement slots in the stats output
    pub fn delta_slots(&self) -> usize {
        self.half() - 1
    }

    /// Absolute slot of lane-local index `i` in lane 1
    pub fn lane1(&self, i: usize) -> usize {
        self.half() + i
    }
}
