//! Evaluation-key material and its serialized form

use serde::{Deserialize, Serialize};

use crate::codec::{from_base64, to_base64};
use crate::error::{Result, StatsError};
use crate::scheme::{ClientScheme, Evaluator};

/// Remote blob holding the general (power-of-two) rotation keys
pub const GALOIS_BLOB: &str = "galoisKey";
/// Remote blob holding the single-step rotation keys
pub const GALOIS_SINGLE_STEP_BLOB: &str = "galoisSingleStepKey";
/// Remote blob holding the relinearization key
pub const RELIN_BLOB: &str = "relinearizeKey";

const MAX_KEY_ID_LEN: usize = 128;

/// The three evaluation-key components as base64 text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBlobs {
    pub galois: String,
    pub galois_single_step: String,
    pub relin: String,
}

/// Deserialized evaluation keys for one key set
///
/// Holds public material only; the secret key never reaches the server.
pub struct KeyMaterial<E: Evaluator> {
    pub key_id: String,
    pub galois: E::GaloisKeys,
    pub galois_single_step: E::GaloisKeys,
    pub relin: E::RelinKeys,
}

impl<E: Evaluator> KeyMaterial<E> {
    pub fn from_blobs(evaluator: &E, key_id: &str, blobs: &KeyBlobs) -> Result<Self> {
        let galois = evaluator.load_galois_keys(&key_bytes(&blobs.galois, GALOIS_BLOB)?)?;
        let galois_single_step = evaluator.load_galois_keys(&key_bytes(
            &blobs.galois_single_step,
            GALOIS_SINGLE_STEP_BLOB,
        )?)?;
        let relin = evaluator.load_relin_keys(&key_bytes(&blobs.relin, RELIN_BLOB)?)?;

        Ok(Self {
            key_id: key_id.to_string(),
            galois,
            galois_single_step,
            relin,
        })
    }

    pub fn to_blobs(&self, evaluator: &E) -> Result<KeyBlobs> {
        Ok(KeyBlobs {
            galois: to_base64(&evaluator.save_galois_keys(&self.galois)?),
            galois_single_step: to_base64(&evaluator.save_galois_keys(&self.galois_single_step)?),
            relin: to_base64(&evaluator.save_relin_keys(&self.relin)?),
        })
    }
}

impl<E: Evaluator> std::fmt::Debug for KeyMaterial<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Generate the evaluation keys for a fresh key set
pub fn generate_key_blobs<S: ClientScheme>(scheme: &S, sk: &S::SecretKey) -> Result<KeyBlobs> {
    let galois = scheme.power_of_two_galois_keys(sk)?;
    let single = scheme.single_step_galois_keys(sk)?;
    let relin = scheme.relin_keys(sk)?;

    Ok(KeyBlobs {
        galois: to_base64(&scheme.save_galois_keys(&galois)?),
        galois_single_step: to_base64(&scheme.save_galois_keys(&single)?),
        relin: to_base64(&scheme.save_relin_keys(&relin)?),
    })
}

/// Key ids name directories and remote containers
pub fn validate_key_id(key_id: &str) -> Result<()> {
    let valid = !key_id.is_empty()
        && key_id.len() <= MAX_KEY_ID_LEN
        && key_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if !valid {
        return Err(StatsError::InvalidKeyMaterial(format!(
            "invalid key id {:?}: expected 1-{} characters from [A-Za-z0-9_-]",
            key_id, MAX_KEY_ID_LEN
        )));
    }
    Ok(())
}

fn key_bytes(text: &str, name: &str) -> Result<Vec<u8>> {
    from_base64(text, name).map_err(|e| StatsError::InvalidKeyMaterial(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SchemeParams;
    use crate::scheme::sim::SimScheme;

    #[test]
    fn test_blobs_round_trip_byte_for_byte() {
        let scheme = SimScheme::with_seed(SchemeParams::slots_256(), 21);
        let (sk, _) = scheme.keygen().unwrap();
        let blobs = generate_key_blobs(&scheme, &sk).unwrap();

        let material = KeyMaterial::from_blobs(&scheme, "user-1", &blobs).unwrap();
        assert_eq!(material.to_blobs(&scheme).unwrap(), blobs);
    }

    #[test]
    fn test_garbage_blob_rejected() {
        let scheme = SimScheme::with_seed(SchemeParams::slots_256(), 21);
        let (sk, _) = scheme.keygen().unwrap();
        let mut blobs = generate_key_blobs(&scheme, &sk).unwrap();
        blobs.relin = "!!not base64!!".to_string();

        let err = KeyMaterial::from_blobs(&scheme, "user-1", &blobs).unwrap_err();
        assert!(matches!(err, StatsError::InvalidKeyMaterial(_)));
    }

    #[test]
    fn test_swapped_blobs_rejected() {
        let scheme = SimScheme::with_seed(SchemeParams::slots_256(), 21);
        let (sk, _) = scheme.keygen().unwrap();
        let mut blobs = generate_key_blobs(&scheme, &sk).unwrap();
        std::mem::swap(&mut blobs.galois, &mut blobs.relin);

        assert!(KeyMaterial::from_blobs(&scheme, "user-1", &blobs).is_err());
    }

    #[test]
    fn test_key_id_validation() {
        assert!(validate_key_id("abc_DEF-123").is_ok());
        assert!(validate_key_id("").is_err());
        assert!(validate_key_id("../etc").is_err());
        assert!(validate_key_id("a/b").is_err());
        assert!(validate_key_id(&"k".repeat(129)).is_err());
        assert!(validate_key_id(&"k".repeat(128)).is_ok());
    }
}
