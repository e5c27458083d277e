//! Two-lane packing
//!
//! Lane 0 occupies `[0, half)` and lane 1 `[half, slot_count)`; entry `i` of
//! one lane is paired with entry `i` of the other.

use crate::error::{Result, StatsError};
use crate::params::SlotLayout;

/// Pack two paired sequences into one slot vector
///
/// Both lanes are zero-padded to `half`. Fails with `Size` when either lane
/// is longer than `half`.
pub fn pack_lanes(lane0: &[f64], lane1: &[f64], layout: &SlotLayout) -> Result<Vec<f64>> {
    let half = layout.half();
    for lane in [lane0, lane1] {
        if lane.len() > half {
            return Err(StatsError::Size {
                len: lane.len(),
                capacity: half,
            });
        }
    }

    let mut slots = vec![0.0; layout.slot_count()];
    slots[..lane0.len()].copy_from_slice(lane0);
    slots[half..half + lane1.len()].copy_from_slice(lane1);
    Ok(slots)
}

/// Split a slot vector into its two lanes
pub fn split_lanes<'a>(slots: &'a [f64], layout: &SlotLayout) -> Result<(&'a [f64], &'a [f64])> {
    if slots.len() != layout.slot_count() {
        return Err(StatsError::Size {
            len: slots.len(),
            capacity: layout.slot_count(),
        });
    }
    Ok(slots.split_at(layout.half()))
}

/// Vector of ones over `range`, zero elsewhere
pub(crate) fn indicator(range: std::ops::Range<usize>, slot_count: usize) -> Vec<f64> {
    let mut v = vec![0.0; slot_count];
    for slot in &mut v[range] {
        *slot = 1.0;
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_and_split() {
        let layout = SlotLayout::new(8);
        let slots = pack_lanes(&[1.0, 2.0], &[3.0], &layout).unwrap();
        assert_eq!(slots, vec![1.0, 2.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0]);

        let (a, b) = split_lanes(&slots, &layout).unwrap();
        assert_eq!(a, &[1.0, 2.0, 0.0, 0.0]);
        assert_eq!(b, &[3.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pack_rejects_long_lane() {
        let layout = SlotLayout::new(8);
        let err = pack_lanes(&[0.0; 5], &[], &layout).unwrap_err();
        assert!(matches!(err, StatsError::Size { len: 5, capacity: 4 }));
    }

    #[test]
    fn test_indicator() {
        assert_eq!(indicator(1..3, 5), vec![0.0, 1.0, 1.0, 0.0, 0.0]);
    }
}
