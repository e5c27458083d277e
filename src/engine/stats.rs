//! Per-run statistics over encrypted telemetry
//!
//! Inputs (see [`SlotLayout`] for the lanes):
//!
//! - position: x in lane 0, y in lane 1
//! - time: z in lane 0, timestamp in lane 1
//! - mask: one-hot calendar buckets, mirrored in both lanes
//! - features: model inputs in the leading slots
//!
//! The client pads every lane past the last sample by repeating that
//! sample, so displacements past the recorded range vanish and the final
//! slot of the timestamp lane holds the last timestamp.
//!
//! Multiplicative depth is 4 for stats/summary and 2 for inference. The
//! sequence of homomorphic operations is fixed by the layout alone; nothing
//! branches on the mask or on any other input value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::masks::Masks;
use crate::codec::{ciphertext_from_base64, ciphertext_to_base64};
use crate::error::{Result, StatsError};
use crate::keys::KeyMaterial;
use crate::params::SlotLayout;
use crate::scheme::Evaluator;

/// Fixed linear model over the six averaged motion axes
/// (gyroscope x/y/z, accelerometer x/y/z)
pub const INFERENCE_COEFFICIENTS: [f64; 6] = [
    0.41964226961135864,
    6.6290693283081055,
    -2.404352903366089,
    -0.024301817640662193,
    -0.17596858739852905,
    0.14117737114429474,
];

/// Raw ciphertexts of one run
#[derive(Debug, Clone)]
pub struct RunCiphertexts<C> {
    pub position: C,
    pub time: C,
    pub mask: C,
    pub features: C,
}

/// Derived ciphertexts of one run
#[derive(Debug, Clone)]
pub struct DerivedCiphertexts<C> {
    pub stats: C,
    pub summary: C,
    pub inference: C,
}

/// Base64 wire form of [`RunCiphertexts`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunBlobs {
    pub position: String,
    pub time: String,
    pub mask: String,
    pub features: String,
}

/// Base64 wire form of [`DerivedCiphertexts`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedBlobs {
    pub stats: String,
    pub summary: String,
    pub inference: String,
}

pub struct StatsEngine<E: Evaluator> {
    evaluator: Arc<E>,
    layout: SlotLayout,
    coefficient_count: usize,
    masks: Masks<E::Plaintext>,
}

impl<E: Evaluator> StatsEngine<E> {
    pub fn new(evaluator: Arc<E>) -> Result<Self> {
        Self::with_coefficients(evaluator, &INFERENCE_COEFFICIENTS)
    }

    pub fn with_coefficients(evaluator: Arc<E>, coefficients: &[f64]) -> Result<Self> {
        evaluator.params().validate().map_err(|e| StatsError::Config(e.to_string()))?;
        let layout = evaluator.params().layout();
        let masks = Masks::new(evaluator.as_ref(), &layout, coefficients)?;

        Ok(Self {
            evaluator,
            layout,
            coefficient_count: coefficients.len(),
            masks,
        })
    }

    pub fn evaluator(&self) -> &Arc<E> {
        &self.evaluator
    }

    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    /// Compute stats, summary and inference for one run
    ///
    /// On error nothing is returned; callers must keep their previous
    /// derived values.
    pub fn compute(
        &self,
        run: &RunCiphertexts<E::Ciphertext>,
        keys: &KeyMaterial<E>,
    ) -> Result<DerivedCiphertexts<E::Ciphertext>> {
        self.compute_cancellable(run, keys, &AtomicBool::new(false))
    }

    /// As [`compute`](Self::compute), aborting with `Computation` once
    /// `cancel` is set
    pub fn compute_cancellable(
        &self,
        run: &RunCiphertexts<E::Ciphertext>,
        keys: &KeyMaterial<E>,
        cancel: &AtomicBool,
    ) -> Result<DerivedCiphertexts<E::Ciphertext>> {
        let start = Instant::now();

        let (totals, inference) = rayon::join(
            || self.stats_and_summary(run, keys, cancel),
            || self.inference(&run.features, keys),
        );
        let (stats, summary) = totals?;
        let inference = inference?;
        checkpoint(cancel)?;

        debug!(
            key_id = %keys.key_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Computed run statistics"
        );

        Ok(DerivedCiphertexts {
            stats,
            summary,
            inference,
        })
    }

    /// Wire-level entry point: base64 in, base64 out
    pub fn compute_blobs(&self, run: &RunBlobs, keys: &KeyMaterial<E>) -> Result<DerivedBlobs> {
        let ev = self.evaluator.as_ref();
        let run = RunCiphertexts {
            position: ciphertext_from_base64(ev, &run.position, "position")?,
            time: ciphertext_from_base64(ev, &run.time, "time")?,
            mask: ciphertext_from_base64(ev, &run.mask, "mask")?,
            features: ciphertext_from_base64(ev, &run.features, "features")?,
        };

        let derived = self.compute(&run, keys)?;

        Ok(DerivedBlobs {
            stats: ciphertext_to_base64(ev, &derived.stats)?,
            summary: ciphertext_to_base64(ev, &derived.summary)?,
            inference: ciphertext_to_base64(ev, &derived.inference)?,
        })
    }

    fn stats_and_summary(
        &self,
        run: &RunCiphertexts<E::Ciphertext>,
        keys: &KeyMaterial<E>,
        cancel: &AtomicBool,
    ) -> Result<(E::Ciphertext, E::Ciphertext)> {
        let ev = self.evaluator.as_ref();
        let m = &self.masks;
        let half = self.layout.half();

        // d[i] = v[i + 1] - v[i]
        let step = Instant::now();
        let d_pos = ev.sub(
            &ev.rotate(&run.position, 1, &keys.galois_single_step)?,
            &run.position,
        )?;
        let d_time = ev.sub(&ev.rotate(&run.time, 1, &keys.galois_single_step)?, &run.time)?;

        let dx = ev.multiply_plain(&d_pos, &m.lane0_deltas)?;
        let dy = ev.multiply_plain(&d_pos, &m.lane1_deltas)?;
        let dz = ev.multiply_plain(&d_time, &m.lane0_deltas)?;
        checkpoint(cancel)?;

        let square = |c: &E::Ciphertext| ev.relinearize(&ev.multiply(c, c)?, &keys.relin);
        let dx2 = square(&dx)?;
        let dy2 = square(&dy)?;
        let dz2 = square(&dz)?;

        // Bring the y terms down onto lane 0
        let deltas = ev.add(
            &ev.add(&dx2, &ev.rotate(&dy2, half, &keys.galois)?)?,
            &dz2,
        )?;
        debug!(elapsed_us = step.elapsed().as_micros() as u64, "Squared displacements");
        checkpoint(cancel)?;

        let step = Instant::now();
        let total = self.rotate_sum(&deltas, self.layout.slot_count(), keys)?;
        let distance = ev.multiply_plain(&total, &m.lane1)?;
        checkpoint(cancel)?;

        // Last timestamp sits at the end of lane 1, the first at its start
        let elapsed = ev.multiply_plain(
            &ev.sub(
                &ev.rotate(&run.time, half, &keys.galois)?,
                &ev.rotate(&run.time, 1, &keys.galois)?,
            )?,
            &m.total_time,
        )?;
        let time_lane0 = self.rotate_sum(&elapsed, half, keys)?;
        debug!(elapsed_us = step.elapsed().as_micros() as u64, "Reduced totals");
        checkpoint(cancel)?;

        let step = Instant::now();
        let summary = ev.relinearize(
            &ev.multiply(&ev.add(&time_lane0, &distance)?, &run.mask)?,
            &keys.relin,
        )?;

        // Lane 0 passes through unchanged; lane 1 is routed by the mask
        let stats_selector = ev.add_plain(&ev.multiply_plain(&run.mask, &m.lane1)?, &m.lane0)?;
        let stats_body = ev.add(&ev.add(&deltas, &elapsed)?, &distance)?;
        let stats = ev.relinearize(&ev.multiply(&stats_body, &stats_selector)?, &keys.relin)?;
        debug!(elapsed_us = step.elapsed().as_micros() as u64, "Applied calendar mask");

        Ok((stats, summary))
    }

    /// Inner product of the features with the model, left in slot 0
    fn inference(
        &self,
        features: &E::Ciphertext,
        keys: &KeyMaterial<E>,
    ) -> Result<E::Ciphertext> {
        let ev = self.evaluator.as_ref();

        let weighted = ev.multiply_plain(features, &self.masks.coefficients)?;
        let mut acc = weighted.clone();
        for i in 1..self.coefficient_count {
            acc = ev.add(&acc, &ev.rotate(&weighted, i, &keys.galois)?)?;
        }

        ev.multiply_plain(&acc, &self.masks.first)
    }

    /// `out[i] = Σ_{j < width} ct[i + j]` by rotate-and-add over power-of-two
    /// steps; `width` is a power of two
    fn rotate_sum(
        &self,
        ct: &E::Ciphertext,
        width: usize,
        keys: &KeyMaterial<E>,
    ) -> Result<E::Ciphertext> {
        let ev = self.evaluator.as_ref();
        let mut acc = ct.clone();
        let mut step = 1;
        while step < width {
            acc = ev.add(&acc, &ev.rotate(&acc, step, &keys.galois)?)?;
            step <<= 1;
        }
        Ok(acc)
    }
}

fn checkpoint(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Relaxed) {
        return Err(StatsError::computation("computation cancelled"));
    }
    Ok(())
}
