//! Plaintext selectors used by the engine
//!
//! All of these depend only on the slot layout and the model coefficients,
//! never on run data, so they are encoded once per engine.

use crate::codec::lanes::indicator;
use crate::error::{Result, StatsError};
use crate::params::SlotLayout;
use crate::scheme::Evaluator;

pub(crate) struct Masks<P> {
    /// Lane-0 displacement slots `[0, half - 1)`
    pub lane0_deltas: P,
    /// Lane-1 displacement slots `[half, n - 1)`
    pub lane1_deltas: P,
    /// All of lane 0
    pub lane0: P,
    /// All of lane 1
    pub lane1: P,
    /// The total-time slot `half - 1`
    pub total_time: P,
    /// Slot 0
    pub first: P,
    pub coefficients: P,
}

impl<P> Masks<P> {
    pub fn new<E>(evaluator: &E, layout: &SlotLayout, coefficients: &[f64]) -> Result<Self>
    where
        E: Evaluator<Plaintext = P>,
    {
        let n = layout.slot_count();
        let half = layout.half();

        if coefficients.is_empty() || coefficients.len() > half {
            return Err(StatsError::Config(format!(
                "model needs between 1 and {} coefficients, got {}",
                half,
                coefficients.len()
            )));
        }

        Ok(Self {
            lane0_deltas: evaluator.encode(&indicator(0..half - 1, n))?,
            lane1_deltas: evaluator.encode(&indicator(half..n - 1, n))?,
            lane0: evaluator.encode(&indicator(0..half, n))?,
            lane1: evaluator.encode(&indicator(half..n, n))?,
            total_time: evaluator.encode(&indicator(half - 1..half, n))?,
            first: evaluator.encode(&indicator(0..1, n))?,
            coefficients: evaluator.encode(coefficients)?,
        })
    }
}
