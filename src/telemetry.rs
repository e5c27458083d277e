//! Client-side packing of recorded runs into the slot layout
//!
//! GPS samples are projected onto a sphere of radius 6371 km. Position and
//! time vectors are padded past the last sample by repeating it, so the
//! server sees zero displacement and the last timestamp at the end of the
//! lane.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::codec::{ciphertext_to_base64, encode_encrypt, pack_lanes};
use crate::engine::RunBlobs;
use crate::error::{Result, StatsError};
use crate::params::SlotLayout;
use crate::scheme::ClientScheme;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Number of model features: gyroscope x/y/z then accelerometer x/y/z
pub const FEATURE_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoSample {
    /// Degrees
    pub lat: f64,
    /// Degrees
    pub lon: f64,
    /// Seconds
    pub timestamp: f64,
    /// Metres above sea level
    #[serde(default)]
    pub altitude: f64,
}

impl GeoSample {
    pub fn to_cartesian(&self) -> [f64; 3] {
        let phi = self.lat.to_radians();
        let lambda = self.lon.to_radians();
        [
            EARTH_RADIUS_KM * phi.cos() * lambda.cos(),
            EARTH_RADIUS_KM * phi.cos() * lambda.sin(),
            EARTH_RADIUS_KM * phi.sin(),
        ]
    }
}

/// Inverse projection: `(lat, lon)` in degrees
pub fn cartesian_to_geo(p: [f64; 3]) -> (f64, f64) {
    let [x, y, z] = p;
    let lat = (z / EARTH_RADIUS_KM).clamp(-1.0, 1.0).asin().to_degrees();
    let lon = y.atan2(x).to_degrees();
    (lat, lon)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub gyro: [f64; 3],
    pub accel: [f64; 3],
}

/// A recorded run as the client holds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
    pub date: NaiveDate,
    pub samples: Vec<GeoSample>,
    #[serde(default)]
    pub motion: Vec<MotionSample>,
}

/// Plaintext slot vectors ready for encryption
#[derive(Debug, Clone, PartialEq)]
pub struct PackedRun {
    pub position: Vec<f64>,
    pub time: Vec<f64>,
    pub mask: Vec<f64>,
    pub features: Vec<f64>,
}

impl RunTrace {
    /// Sum of the climbs between consecutive samples, in metres
    pub fn elevation_gain(&self) -> f64 {
        self.samples
            .windows(2)
            .map(|w| (w[1].altitude - w[0].altitude).max(0.0))
            .sum()
    }

    /// Mean of each motion axis; zeros without motion data
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        let mut sums = [0.0; FEATURE_COUNT];
        if self.motion.is_empty() {
            return sums;
        }

        for m in &self.motion {
            for axis in 0..3 {
                sums[axis] += m.gyro[axis];
                sums[axis + 3] += m.accel[axis];
            }
        }

        let n = self.motion.len() as f64;
        sums.map(|s| s / n)
    }

    pub fn pack(&self, layout: &SlotLayout) -> Result<PackedRun> {
        let half = layout.half();
        if self.samples.len() > half {
            return Err(StatsError::Size {
                len: self.samples.len(),
                capacity: half,
            });
        }

        let mut xs = Vec::with_capacity(half);
        let mut ys = Vec::with_capacity(half);
        let mut zs = Vec::with_capacity(half);
        let mut ts = Vec::with_capacity(half);
        for sample in &self.samples {
            let [x, y, z] = sample.to_cartesian();
            xs.push(x);
            ys.push(y);
            zs.push(z);
            ts.push(sample.timestamp);
        }

        for lane in [&mut xs, &mut ys, &mut zs, &mut ts] {
            let last = lane.last().copied().unwrap_or(0.0);
            lane.resize(half, last);
        }

        Ok(PackedRun {
            position: pack_lanes(&xs, &ys, layout)?,
            time: pack_lanes(&zs, &ts, layout)?,
            mask: CalendarBuckets::mask(self.date, self.elevation_gain(), layout)?,
            features: self.features().to_vec(),
        })
    }

    /// Pack and encrypt into the wire form the server accepts
    pub fn encrypt<S: ClientScheme>(&self, scheme: &S, pk: &S::PublicKey) -> Result<RunBlobs> {
        let packed = self.pack(&scheme.params().layout())?;
        let seal = |values: &[f64]| -> Result<String> {
            ciphertext_to_base64(scheme, &encode_encrypt(scheme, values, pk)?)
        };

        Ok(RunBlobs {
            position: seal(&packed.position)?,
            time: seal(&packed.time)?,
            mask: seal(&packed.mask)?,
            features: seal(&packed.features)?,
        })
    }
}

/// Calendar bucket offsets within a lane
///
/// | Family       | Slots        |
/// |--------------|--------------|
/// | year % 100   | `[0, 100)`   |
/// | day of week  | `[100, 107)` (Sunday first) |
/// | ISO week     | `[107, 160)` |
/// | day of year  | `[160, 526)` |
///
/// Slot 526 carries the run's elevation gain. The engine multiplies the
/// whole mask by the run totals, so the summary holds `gain × total_time`
/// there and the ratio to a year bucket recovers the gain (a time-weighted
/// mean once summaries are merged).
pub struct CalendarBuckets;

impl CalendarBuckets {
    pub const YEAR: usize = 0;
    pub const DAY_OF_WEEK: usize = 100;
    pub const WEEK_OF_YEAR: usize = 107;
    pub const DAY_OF_YEAR: usize = 160;
    pub const END: usize = 526;
    pub const ELEVATION_GAIN: usize = 526;
    /// Slots used per lane
    pub const WIDTH: usize = 527;

    /// The four active bucket slots for `date`
    pub fn indices(date: NaiveDate) -> [usize; 4] {
        [
            Self::YEAR + date.year().rem_euclid(100) as usize,
            Self::DAY_OF_WEEK + date.weekday().num_days_from_sunday() as usize,
            Self::WEEK_OF_YEAR + date.iso_week().week0() as usize,
            Self::DAY_OF_YEAR + date.ordinal0() as usize,
        ]
    }

    /// Whether each lane of `layout` can hold the mask
    pub fn check_layout(layout: &SlotLayout) -> Result<()> {
        if layout.half() < Self::WIDTH {
            return Err(StatsError::Size {
                len: Self::WIDTH,
                capacity: layout.half(),
            });
        }
        Ok(())
    }

    /// One-hot per family plus the elevation gain in lane 0, mirrored in
    /// lane 1
    pub fn mask(date: NaiveDate, elevation_gain: f64, layout: &SlotLayout) -> Result<Vec<f64>> {
        Self::check_layout(layout)?;

        let mut mask = vec![0.0; layout.slot_count()];
        for i in Self::indices(date) {
            mask[i] = 1.0;
            mask[layout.lane1(i)] = 1.0;
        }
        mask[Self::ELEVATION_GAIN] = elevation_gain;
        mask[layout.lane1(Self::ELEVATION_GAIN)] = elevation_gain;
        Ok(mask)
    }
}
