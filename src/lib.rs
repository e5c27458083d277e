//! runstat: run statistics over batched homomorphic ciphertexts
//!
//! A client records GPS and motion traces, packs them into a fixed slot
//! layout and encrypts them. The server derives per-run statistics
//! (displacements, distance, elapsed time, calendar-bucketed summary and an
//! inference score) without ever holding a decryption key, and folds
//! per-run summaries into a lifetime summary by homomorphic addition.
//!
//! Key components:
//! - [`engine::StatsEngine`] and [`engine::SummaryMerger`]: the server-side
//!   computation
//! - [`keys::KeyStore`]: evaluation-key resolution with an on-disk cache in
//!   front of a remote object store
//! - [`codec`], [`telemetry`], [`report`]: slot layout, client packing and
//!   decoding
//! - [`scheme`]: the capability traits the engine is written against, with
//!   an in-tree reference backend

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod params;
pub mod records;
pub mod report;
pub mod scheme;
#[cfg(feature = "server")]
pub mod service;
pub mod telemetry;

pub use engine::{
    DerivedBlobs, DerivedCiphertexts, RunBlobs, RunCiphertexts, StatsEngine, SummaryMerger,
};
pub use error::{ErrorClass, Result, StatsError};
pub use keys::{KeyBlobs, KeyMaterial, KeyStore};
pub use params::{SchemeParams, SlotLayout};
pub use records::{LifetimeSummary, RunRecord};
pub use report::RunReport;
pub use telemetry::{GeoSample, MotionSample, RunTrace};
