//! Transparent reference backend
//!
//! `SimScheme` keeps slot values in the clear and injects bounded discrete
//! Gaussian noise at encryption and after every multiplication or key
//! switch, so results carry the same kind of approximation error a CKKS
//! evaluation would. It tracks what a real backend would reject: operands
//! from different key sets, size-3 ciphertexts fed to rotations or further
//! multiplications, and running past the multiplicative depth.
//!
//! **This backend provides no confidentiality.** It exists to exercise the
//! engine and the key lifecycle in tests and local development.

mod client;
mod eval;
pub mod noise;
pub mod types;

use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StatsError};
use crate::params::SchemeParams;

pub use noise::NoiseSampler;
pub use types::{
    SimCiphertext, SimGaloisKeys, SimPlaintext, SimPublicKey, SimRelinKeys, SimSecretKey,
};

const CIPHERTEXT_MAGIC: &[u8; 4] = b"RSCT";
const GALOIS_MAGIC: &[u8; 4] = b"RSGK";
const RELIN_MAGIC: &[u8; 4] = b"RSRK";
const SECRET_MAGIC: &[u8; 4] = b"RSSK";
const PUBLIC_MAGIC: &[u8; 4] = b"RSPK";

pub struct SimScheme {
    params: SchemeParams,
    noise: Mutex<NoiseSampler>,
}

impl SimScheme {
    /// Backend with noise drawn from OS entropy
    pub fn new(params: SchemeParams) -> Self {
        let noise = NoiseSampler::from_entropy(params.sigma);
        Self {
            params,
            noise: Mutex::new(noise),
        }
    }

    /// Deterministic backend for reproducible tests
    pub fn with_seed(params: SchemeParams, seed: u64) -> Self {
        let noise = NoiseSampler::with_seed(params.sigma, seed);
        Self {
            params,
            noise: Mutex::new(noise),
        }
    }

    fn slot_noise(&self) -> Result<Vec<f64>> {
        let mut noise = self
            .noise
            .lock()
            .map_err(|_| StatsError::lock_poisoned("noise sampler"))?;
        Ok(noise.slot_noise(
            self.params.slot_count,
            self.params.ring_dim(),
            self.params.scale(),
        ))
    }

    fn next_tag(&self) -> Result<u64> {
        let mut noise = self
            .noise
            .lock()
            .map_err(|_| StatsError::lock_poisoned("noise sampler"))?;
        Ok(noise.next_u64())
    }

    /// Add fresh noise to every slot
    fn perturb(&self, slots: &mut [f64]) -> Result<()> {
        let noise = self.slot_noise()?;
        for (s, e) in slots.iter_mut().zip(noise) {
            *s += e;
        }
        Ok(())
    }

    fn check_slot_count(&self, slot_count: usize, what: &str) -> Result<()> {
        if slot_count != self.params.slot_count {
            return Err(StatsError::IncompatibleOperands(format!(
                "{} has {} slots, evaluator expects {}",
                what, slot_count, self.params.slot_count
            )));
        }
        Ok(())
    }

    fn check_pair(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<()> {
        if a.slot_count != b.slot_count {
            return Err(StatsError::IncompatibleOperands(format!(
                "slot counts differ: {} vs {}",
                a.slot_count, b.slot_count
            )));
        }
        if a.tag != b.tag {
            return Err(StatsError::IncompatibleOperands(
                "ciphertexts belong to different key sets".to_string(),
            ));
        }
        self.check_slot_count(a.slot_count, "ciphertext")
    }

    fn check_depth(&self, depth: u32) -> Result<()> {
        if depth > self.params.max_depth {
            return Err(StatsError::computation(format!(
                "noise budget exhausted: depth {} exceeds {}",
                depth, self.params.max_depth
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SimScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimScheme")
            .field("params", &self.params)
            .finish()
    }
}

fn save_object<T: Serialize>(magic: &[u8; 4], value: &T) -> Result<Vec<u8>> {
    let body = bincode::serialize(value)
        .map_err(|e| StatsError::computation(format!("serialization failed: {}", e)))?;
    let mut bytes = Vec::with_capacity(magic.len() + body.len());
    bytes.extend_from_slice(magic);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Strip the magic header and decode the body; `None` on any mismatch
fn load_object<T: DeserializeOwned>(magic: &[u8; 4], bytes: &[u8]) -> Option<T> {
    let body = bytes.strip_prefix(magic.as_slice())?;
    bincode::deserialize(body).ok()
}
