//! Server-side computation over encrypted runs
//!
//! - [`StatsEngine`]: per-run displacement, distance, elapsed time,
//!   calendar-bucketed summary and inference score
//! - [`SummaryMerger`]: folds a run summary into a lifetime summary
//!
//! Both operate on ciphertexts and public evaluation keys only. Work is
//! CPU-bound and synchronous; async callers should dispatch it to a
//! blocking pool.

mod masks;
pub mod merge;
pub mod stats;

pub use merge::SummaryMerger;
pub use stats::{
    DerivedBlobs, DerivedCiphertexts, RunBlobs, RunCiphertexts, StatsEngine,
    INFERENCE_COEFFICIENTS,
};
