use std::sync::Arc;

use tracing::debug;

use crate::codec::{ciphertext_from_base64, ciphertext_to_base64};
use crate::error::Result;
use crate::scheme::Evaluator;

/// Folds per-run summaries into a lifetime summary
///
/// Slot-wise addition: commutative and associative up to scheme noise.
///
/// Precondition: merges into the same lifetime summary must be serialized
/// by the caller. The fold is a read-modify-write of shared encrypted state
/// and the merger keeps no state of its own to guard it.
pub struct SummaryMerger<E: Evaluator> {
    evaluator: Arc<E>,
}

impl<E: Evaluator> SummaryMerger<E> {
    pub fn new(evaluator: Arc<E>) -> Self {
        Self { evaluator }
    }

    /// Fails with `IncompatibleOperands` across slot counts or key sets
    pub fn add(&self, a: &E::Ciphertext, b: &E::Ciphertext) -> Result<E::Ciphertext> {
        self.evaluator.add(a, b)
    }

    /// Wire-level merge of two base64 summaries
    pub fn add_blobs(&self, new_summary: &str, stored_summary: &str) -> Result<String> {
        let ev = self.evaluator.as_ref();
        let a = ciphertext_from_base64(ev, new_summary, "new_summary")?;
        let b = ciphertext_from_base64(ev, stored_summary, "stored_summary")?;

        let merged = self.add(&a, &b)?;
        debug!("Merged summary ciphertexts");
        ciphertext_to_base64(ev, &merged)
    }

    /// Parse and re-serialize a summary, rejecting anything that does not load
    pub fn normalize(&self, summary: &str) -> Result<String> {
        let ev = self.evaluator.as_ref();
        let ct = ciphertext_from_base64(ev, summary, "summary")?;
        ciphertext_to_base64(ev, &ct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decrypt_decode, encode_encrypt};
    use crate::error::StatsError;
    use crate::params::SchemeParams;
    use crate::scheme::sim::SimScheme;
    use crate::scheme::ClientScheme;

    #[test]
    fn test_merge_adds_slots() {
        let scheme = Arc::new(SimScheme::with_seed(SchemeParams::slots_256(), 8));
        let (sk, pk) = scheme.keygen().unwrap();
        let merger = SummaryMerger::new(scheme.clone());

        let a = encode_encrypt(scheme.as_ref(), &[1.0, 0.0, 3.0], &pk).unwrap();
        let b = encode_encrypt(scheme.as_ref(), &[2.0, 5.0, 0.0], &pk).unwrap();
        let sum = decrypt_decode(scheme.as_ref(), &merger.add(&a, &b).unwrap(), &sk).unwrap();

        assert!((sum[0] - 3.0).abs() < 1e-5);
        assert!((sum[1] - 5.0).abs() < 1e-5);
        assert!((sum[2] - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_merge_rejects_foreign_key_set() {
        let scheme = Arc::new(SimScheme::with_seed(SchemeParams::slots_256(), 8));
        let (_, pk_a) = scheme.keygen().unwrap();
        let (_, pk_b) = scheme.keygen().unwrap();
        let merger = SummaryMerger::new(scheme.clone());

        let a = encode_encrypt(scheme.as_ref(), &[1.0], &pk_a).unwrap();
        let b = encode_encrypt(scheme.as_ref(), &[1.0], &pk_b).unwrap();
        assert!(matches!(
            merger.add(&a, &b),
            Err(StatsError::IncompatibleOperands(_))
        ));
    }

    #[test]
    fn test_merge_rejects_other_slot_count() {
        let small = Arc::new(SimScheme::with_seed(SchemeParams::slots_256(), 8));
        let large = SimScheme::with_seed(SchemeParams::slots_4096(), 8);
        let (_, pk_small) = small.keygen().unwrap();
        let (_, pk_large) = large.keygen().unwrap();
        let merger = SummaryMerger::new(small.clone());

        let a = encode_encrypt(small.as_ref(), &[1.0], &pk_small).unwrap();
        let b = encode_encrypt(&large, &[1.0], &pk_large).unwrap();
        assert!(matches!(
            merger.add(&a, &b),
            Err(StatsError::IncompatibleOperands(_))
        ));
    }

    #[test]
    fn test_add_blobs_rejects_garbage() {
        let scheme = Arc::new(SimScheme::with_seed(SchemeParams::slots_256(), 8));
        let merger = SummaryMerger::new(scheme);
        let err = merger.add_blobs("AAAA", "AAAA").unwrap_err();
        assert!(matches!(err, StatsError::InvalidCiphertext(_)));
    }
}
