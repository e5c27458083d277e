use crate::error::{Result, StatsError};
use crate::params::SchemeParams;
use crate::scheme::galois;
use crate::scheme::Evaluator;

use super::{
    load_object, save_object, SimCiphertext, SimGaloisKeys, SimPlaintext, SimRelinKeys,
    SimScheme, CIPHERTEXT_MAGIC, GALOIS_MAGIC, RELIN_MAGIC,
};

impl SimScheme {
    fn zip_slots(
        &self,
        a: &SimCiphertext,
        b: &SimCiphertext,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Vec<f64>> {
        self.check_pair(a, b)?;
        Ok(a.slots.iter().zip(&b.slots).map(|(&x, &y)| f(x, y)).collect())
    }

    fn check_plain(&self, a: &SimCiphertext, p: &SimPlaintext) -> Result<()> {
        self.check_slot_count(a.slot_count, "ciphertext")?;
        self.check_slot_count(p.slot_count(), "plaintext")
    }

    fn check_linear(&self, a: &SimCiphertext, op: &str) -> Result<()> {
        if a.size != 2 {
            return Err(StatsError::computation(format!(
                "{} requires a relinearized ciphertext, got size {}",
                op, a.size
            )));
        }
        Ok(())
    }

    fn check_keys(&self, a: &SimCiphertext, tag: u64, slot_count: usize) -> Result<()> {
        self.check_slot_count(slot_count, "evaluation key")?;
        if a.tag != tag {
            return Err(StatsError::IncompatibleOperands(
                "ciphertext and evaluation keys belong to different key sets".to_string(),
            ));
        }
        Ok(())
    }
}

impl Evaluator for SimScheme {
    type Ciphertext = SimCiphertext;
    type Plaintext = SimPlaintext;
    type GaloisKeys = SimGaloisKeys;
    type RelinKeys = SimRelinKeys;

    fn params(&self) -> &SchemeParams {
        &self.params
    }

    fn encode(&self, values: &[f64]) -> Result<SimPlaintext> {
        let capacity = self.params.slot_count;
        if values.len() > capacity {
            return Err(StatsError::Size {
                len: values.len(),
                capacity,
            });
        }

        let mut slots = values.to_vec();
        slots.resize(capacity, 0.0);
        Ok(SimPlaintext { slots })
    }

    fn add(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        let slots = self.zip_slots(a, b, |x, y| x + y)?;
        Ok(SimCiphertext {
            size: a.size.max(b.size),
            depth: a.depth.max(b.depth),
            slots,
            ..a.clone()
        })
    }

    fn sub(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        let slots = self.zip_slots(a, b, |x, y| x - y)?;
        Ok(SimCiphertext {
            size: a.size.max(b.size),
            depth: a.depth.max(b.depth),
            slots,
            ..a.clone()
        })
    }

    fn add_plain(&self, a: &SimCiphertext, p: &SimPlaintext) -> Result<SimCiphertext> {
        self.check_plain(a, p)?;
        let slots = a.slots.iter().zip(&p.slots).map(|(x, y)| x + y).collect();
        Ok(SimCiphertext { slots, ..a.clone() })
    }

    fn multiply(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext> {
        self.check_linear(a, "multiply")?;
        self.check_linear(b, "multiply")?;
        let depth = a.depth.max(b.depth) + 1;
        self.check_depth(depth)?;

        let mut slots = self.zip_slots(a, b, |x, y| x * y)?;
        self.perturb(&mut slots)?;
        Ok(SimCiphertext {
            size: 3,
            depth,
            slots,
            ..a.clone()
        })
    }

    fn multiply_plain(&self, a: &SimCiphertext, p: &SimPlaintext) -> Result<SimCiphertext> {
        self.check_plain(a, p)?;
        let depth = a.depth + 1;
        self.check_depth(depth)?;

        let mut slots: Vec<f64> = a.slots.iter().zip(&p.slots).map(|(x, y)| x * y).collect();
        self.perturb(&mut slots)?;
        Ok(SimCiphertext {
            depth,
            slots,
            ..a.clone()
        })
    }

    fn relinearize(&self, a: &SimCiphertext, keys: &SimRelinKeys) -> Result<SimCiphertext> {
        self.check_keys(a, keys.tag, keys.slot_count)?;
        if a.size == 2 {
            return Ok(a.clone());
        }

        let mut slots = a.slots.clone();
        self.perturb(&mut slots)?;
        Ok(SimCiphertext {
            size: 2,
            slots,
            ..a.clone()
        })
    }

    fn rotate(
        &self,
        a: &SimCiphertext,
        steps: usize,
        keys: &SimGaloisKeys,
    ) -> Result<SimCiphertext> {
        self.check_linear(a, "rotate")?;
        self.check_keys(a, keys.tag, keys.slot_count)?;

        let n = a.slot_count;
        let path = galois::rotation_path(steps, n, &keys.elements).map_err(|missing| {
            StatsError::MissingKey(format!(
                "no rotation key for Galois element {} (rotation by {})",
                missing, steps
            ))
        })?;

        let mut out = a.clone();
        for element in path {
            // Every element in a key set is a power of 3, so this always resolves
            let hop = galois::element_steps(element, n).ok_or_else(|| {
                StatsError::InvalidKeyMaterial(format!(
                    "Galois element {} is not a slot rotation",
                    element
                ))
            })?;
            out.slots.rotate_left(hop);
            self.perturb(&mut out.slots)?;
        }

        Ok(out)
    }

    fn save_ciphertext(&self, ct: &SimCiphertext) -> Result<Vec<u8>> {
        save_object(CIPHERTEXT_MAGIC, ct)
    }

    fn load_ciphertext(&self, bytes: &[u8]) -> Result<SimCiphertext> {
        let ct: SimCiphertext = load_object(CIPHERTEXT_MAGIC, bytes).ok_or_else(|| {
            StatsError::InvalidCiphertext("not a serialized ciphertext".to_string())
        })?;

        if ct.slot_count != self.params.slot_count || ct.slots.len() != ct.slot_count {
            return Err(StatsError::InvalidCiphertext(format!(
                "ciphertext has {} slots, expected {}",
                ct.slots.len(),
                self.params.slot_count
            )));
        }
        if ct.size != 2 && ct.size != 3 {
            return Err(StatsError::InvalidCiphertext(format!(
                "unsupported ciphertext size {}",
                ct.size
            )));
        }

        Ok(ct)
    }

    fn save_galois_keys(&self, keys: &SimGaloisKeys) -> Result<Vec<u8>> {
        save_object(GALOIS_MAGIC, keys)
    }

    fn load_galois_keys(&self, bytes: &[u8]) -> Result<SimGaloisKeys> {
        let keys: SimGaloisKeys = load_object(GALOIS_MAGIC, bytes).ok_or_else(|| {
            StatsError::InvalidKeyMaterial("not a serialized Galois key set".to_string())
        })?;

        if keys.slot_count != self.params.slot_count {
            return Err(StatsError::InvalidKeyMaterial(format!(
                "Galois keys are for {} slots, expected {}",
                keys.slot_count, self.params.slot_count
            )));
        }
        if let Some(bad) = keys
            .elements
            .iter()
            .find(|&&g| !galois::is_valid_galois_element(g, self.params.ring_dim()))
        {
            return Err(StatsError::InvalidKeyMaterial(format!(
                "invalid Galois element {}",
                bad
            )));
        }

        Ok(keys)
    }

    fn save_relin_keys(&self, keys: &SimRelinKeys) -> Result<Vec<u8>> {
        save_object(RELIN_MAGIC, keys)
    }

    fn load_relin_keys(&self, bytes: &[u8]) -> Result<SimRelinKeys> {
        let keys: SimRelinKeys = load_object(RELIN_MAGIC, bytes).ok_or_else(|| {
            StatsError::InvalidKeyMaterial("not a serialized relinearization key".to_string())
        })?;

        if keys.slot_count != self.params.slot_count {
            return Err(StatsError::InvalidKeyMaterial(format!(
                "relinearization key is for {} slots, expected {}",
                keys.slot_count, self.params.slot_count
            )));
        }

        Ok(keys)
    }
}
