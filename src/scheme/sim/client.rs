use crate::error::{Result, StatsError};
use crate::scheme::galois;
use crate::scheme::ClientScheme;

use super::{
    load_object, save_object, SimCiphertext, SimGaloisKeys, SimPlaintext, SimPublicKey,
    SimRelinKeys, SimScheme, SimSecretKey, PUBLIC_MAGIC, SECRET_MAGIC,
};

impl ClientScheme for SimScheme {
    type SecretKey = SimSecretKey;
    type PublicKey = SimPublicKey;

    fn keygen(&self) -> Result<(SimSecretKey, SimPublicKey)> {
        let tag = self.next_tag()?;
        let slot_count = self.params.slot_count;
        Ok((
            SimSecretKey { tag, slot_count },
            SimPublicKey { tag, slot_count },
        ))
    }

    fn encrypt(&self, pt: &SimPlaintext, pk: &SimPublicKey) -> Result<SimCiphertext> {
        self.check_slot_count(pk.slot_count, "public key")?;
        self.check_slot_count(pt.slot_count(), "plaintext")?;

        let mut slots = pt.slots.clone();
        self.perturb(&mut slots)?;
        Ok(SimCiphertext {
            tag: pk.tag,
            slot_count: pk.slot_count,
            size: 2,
            depth: 0,
            slots,
        })
    }

    fn decrypt(&self, ct: &SimCiphertext, sk: &SimSecretKey) -> Result<SimPlaintext> {
        if ct.tag != sk.tag || ct.slot_count != sk.slot_count {
            return Err(StatsError::InvalidCiphertext(
                "ciphertext was not encrypted under this secret key".to_string(),
            ));
        }
        Ok(SimPlaintext {
            slots: ct.slots.clone(),
        })
    }

    fn decode(&self, pt: &SimPlaintext) -> Result<Vec<f64>> {
        self.check_slot_count(pt.slot_count(), "plaintext")?;
        Ok(pt.slots.clone())
    }

    fn galois_keys(&self, sk: &SimSecretKey, elements: &[usize]) -> Result<SimGaloisKeys> {
        let ring_dim = self.params.ring_dim();
        if let Some(bad) = elements
            .iter()
            .find(|&&g| !galois::is_valid_galois_element(g, ring_dim))
        {
            return Err(StatsError::InvalidKeyMaterial(format!(
                "invalid Galois element {}",
                bad
            )));
        }

        Ok(SimGaloisKeys {
            tag: sk.tag,
            slot_count: sk.slot_count,
            elements: elements.iter().copied().collect(),
        })
    }

    fn relin_keys(&self, sk: &SimSecretKey) -> Result<SimRelinKeys> {
        Ok(SimRelinKeys {
            tag: sk.tag,
            slot_count: sk.slot_count,
        })
    }

    fn save_secret_key(&self, sk: &SimSecretKey) -> Result<Vec<u8>> {
        save_object(SECRET_MAGIC, sk)
    }

    fn load_secret_key(&self, bytes: &[u8]) -> Result<SimSecretKey> {
        let sk: SimSecretKey = load_object(SECRET_MAGIC, bytes).ok_or_else(|| {
            StatsError::InvalidKeyMaterial("not a serialized secret key".to_string())
        })?;
        self.check_slot_count(sk.slot_count, "secret key")
            .map_err(|e| StatsError::InvalidKeyMaterial(e.to_string()))?;
        Ok(sk)
    }

    fn save_public_key(&self, pk: &SimPublicKey) -> Result<Vec<u8>> {
        save_object(PUBLIC_MAGIC, pk)
    }

    fn load_public_key(&self, bytes: &[u8]) -> Result<SimPublicKey> {
        let pk: SimPublicKey = load_object(PUBLIC_MAGIC, bytes).ok_or_else(|| {
            StatsError::InvalidKeyMaterial("not a serialized public key".to_string())
        })?;
        self.check_slot_count(pk.slot_count, "public key")
            .map_err(|e| StatsError::InvalidKeyMaterial(e.to_string()))?;
        Ok(pk)
    }
}
