//! Client-side interpretation of decrypted run outputs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::codec::{ciphertext_from_base64, decrypt_decode};
use crate::engine::DerivedBlobs;
use crate::error::{Result, StatsError};
use crate::params::SlotLayout;
use crate::scheme::ClientScheme;
use crate::telemetry::CalendarBuckets;

/// Sampling interval the client records at
pub const DEFAULT_SAMPLE_INTERVAL_SECS: f64 = 2.0;

/// Below this distance pace is reported as zero
const MIN_PACE_DISTANCE_KM: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub total_time_secs: f64,
    pub total_distance_km: f64,
    /// Seconds per kilometre
    pub pace_secs_per_km: f64,
    /// Raw model output
    pub score: f64,
    /// Logistic of `score`
    pub probability: f64,
    /// Recovered from the summary buckets
    pub date: Option<NaiveDate>,
    /// Metres climbed; a time-weighted mean when read from a lifetime summary
    #[serde(default)]
    pub elevation_gain_m: f64,
}

impl RunReport {
    pub fn from_slots(
        stats: &[f64],
        summary: &[f64],
        inference: &[f64],
        layout: &SlotLayout,
    ) -> Result<Self> {
        Self::with_interval(stats, summary, inference, layout, DEFAULT_SAMPLE_INTERVAL_SECS)
    }

    pub fn with_interval(
        stats: &[f64],
        summary: &[f64],
        inference: &[f64],
        layout: &SlotLayout,
        sample_interval_secs: f64,
    ) -> Result<Self> {
        for slots in [stats, summary] {
            if slots.len() != layout.slot_count() {
                return Err(StatsError::Size {
                    len: slots.len(),
                    capacity: layout.slot_count(),
                });
            }
        }
        let score = *inference.first().ok_or(StatsError::Size {
            len: 0,
            capacity: layout.slot_count(),
        })?;

        let total_time_secs = stats[layout.total_time_slot()];

        // Only the displacements inside the recorded range carry signal
        let samples = (total_time_secs / sample_interval_secs).round().max(0.0) as usize;
        let count = samples.min(layout.delta_slots());
        let total_distance_km: f64 = stats[..count].iter().map(|d| d.abs().sqrt()).sum();

        let pace_secs_per_km = if total_distance_km < MIN_PACE_DISTANCE_KM {
            0.0
        } else {
            total_time_secs / total_distance_km
        };

        Ok(Self {
            total_time_secs,
            total_distance_km,
            pace_secs_per_km,
            score,
            probability: sigmoid(score),
            date: date_from_summary(summary),
            elevation_gain_m: elevation_from_summary(summary),
        })
    }

    /// Decrypt the three derived blobs and interpret them
    pub fn decrypt<S: ClientScheme>(
        scheme: &S,
        sk: &S::SecretKey,
        derived: &DerivedBlobs,
    ) -> Result<Self> {
        let open = |text: &str, what: &str| -> Result<Vec<f64>> {
            let ct = ciphertext_from_base64(scheme, text, what)?;
            decrypt_decode(scheme, &ct, sk)
        };

        let stats = open(&derived.stats, "stats")?;
        let summary = open(&derived.summary, "summary")?;
        let inference = open(&derived.inference, "inference")?;
        Self::from_slots(&stats, &summary, &inference, &scheme.params().layout())
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Date of a run from its summary: the active year and day-of-year buckets
/// hold the elapsed time, so the first bucket above 1 in each family wins
pub fn date_from_summary(summary: &[f64]) -> Option<NaiveDate> {
    if summary.len() < CalendarBuckets::END {
        return None;
    }

    let year = summary[CalendarBuckets::YEAR..CalendarBuckets::DAY_OF_WEEK]
        .iter()
        .position(|&v| v > 1.0)?;
    let day = summary[CalendarBuckets::DAY_OF_YEAR..CalendarBuckets::END]
        .iter()
        .position(|&v| v > 1.0)?;

    NaiveDate::from_yo_opt(2000 + year as i32, day as u32 + 1)
}

/// Elevation slot over the first populated year bucket. Both hold the run
/// time as a factor, so the ratio is the gain. Zero when no year is set.
pub fn elevation_from_summary(summary: &[f64]) -> f64 {
    if summary.len() < CalendarBuckets::WIDTH {
        return 0.0;
    }

    summary[CalendarBuckets::YEAR..CalendarBuckets::DAY_OF_WEEK]
        .iter()
        .find(|&&v| v > 0.0001)
        .map(|&time| summary[CalendarBuckets::ELEVATION_GAIN] / time)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SlotLayout {
        SlotLayout::new(4096)
    }

    #[test]
    fn test_report_from_slots() {
        let layout = layout();
        let mut stats = vec![0.0; 4096];
        // 3-4-5 style steps: 0.3 km and 0.4 km
        stats[0] = 0.09;
        stats[1] = 0.16;
        // Noise past the recorded range must be ignored
        stats[10] = 4.0;
        stats[layout.total_time_slot()] = 4.0;

        let mut summary = vec![0.0; 4096];
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        for i in CalendarBuckets::indices(date) {
            summary[i] = 4.0;
        }
        summary[CalendarBuckets::ELEVATION_GAIN] = 4.0 * 12.5;

        let report = RunReport::from_slots(&stats, &summary, &[0.0], &layout).unwrap();
        assert_eq!(report.total_time_secs, 4.0);
        assert!((report.total_distance_km - 0.7).abs() < 1e-12);
        assert!((report.pace_secs_per_km - 4.0 / 0.7).abs() < 1e-9);
        assert_eq!(report.probability, 0.5);
        assert_eq!(report.date, Some(date));
        assert!((report.elevation_gain_m - 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_distance_pace() {
        let layout = layout();
        let stats = vec![0.0; 4096];
        let summary = vec![0.0; 4096];
        let report = RunReport::from_slots(&stats, &summary, &[2.0], &layout).unwrap();
        assert_eq!(report.pace_secs_per_km, 0.0);
        assert_eq!(report.date, None);
        assert_eq!(report.elevation_gain_m, 0.0);
        assert!((report.probability - sigmoid(2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let layout = layout();
        assert!(RunReport::from_slots(&[0.0; 10], &[0.0; 4096], &[0.0], &layout).is_err());
        assert!(RunReport::from_slots(&[0.0; 4096], &[0.0; 4096], &[], &layout).is_err());
    }

    #[test]
    fn test_date_needs_both_families() {
        let mut summary = vec![0.0; 4096];
        summary[24] = 10.0;
        assert_eq!(date_from_summary(&summary), None);
        summary[CalendarBuckets::DAY_OF_YEAR] = 10.0;
        assert_eq!(date_from_summary(&summary), NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn test_elevation_is_time_weighted_over_runs() {
        // 10 s at 30 m and 30 s at 10 m folded into one summary
        let mut summary = vec![0.0; 4096];
        summary[25] = 40.0;
        summary[CalendarBuckets::ELEVATION_GAIN] = 10.0 * 30.0 + 30.0 * 10.0;
        assert!((elevation_from_summary(&summary) - 15.0).abs() < 1e-12);

        // Noise-level year buckets are skipped
        summary[3] = 0.00005;
        assert!((elevation_from_summary(&summary) - 15.0).abs() < 1e-12);

        assert_eq!(elevation_from_summary(&summary[..526]), 0.0);
    }
}
