//! Stored run and summary records
//!
//! These model what the record store keeps per run and per key set. The
//! update helpers apply results only on success: a failed computation or
//! merge returns the error and leaves every stored field as it was.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::{DerivedBlobs, RunBlobs, StatsEngine, SummaryMerger};
use crate::error::{Result, StatsError};
use crate::keys::KeyStore;
use crate::scheme::Evaluator;

/// One recorded activity
///
/// Inputs come from the client. Derived fields are written only by
/// [`compute_stats`](Self::compute_stats); the mask input and the summary
/// output are separate fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub key_id: String,
    pub position: String,
    pub time: String,
    pub mask_input: String,
    pub features: String,
    stats: Option<String>,
    summary_output: Option<String>,
    inference: Option<String>,
}

impl RunRecord {
    pub fn new(key_id: impl Into<String>, inputs: RunBlobs) -> Self {
        Self {
            key_id: key_id.into(),
            position: inputs.position,
            time: inputs.time,
            mask_input: inputs.mask,
            features: inputs.features,
            stats: None,
            summary_output: None,
            inference: None,
        }
    }

    pub fn inputs(&self) -> RunBlobs {
        RunBlobs {
            position: self.position.clone(),
            time: self.time.clone(),
            mask: self.mask_input.clone(),
            features: self.features.clone(),
        }
    }

    pub fn stats(&self) -> Option<&str> {
        self.stats.as_deref()
    }

    pub fn summary_output(&self) -> Option<&str> {
        self.summary_output.as_deref()
    }

    pub fn inference(&self) -> Option<&str> {
        self.inference.as_deref()
    }

    /// Resolve keys, run the engine and store the three derived fields
    ///
    /// On error the record is untouched.
    pub fn compute_stats<E: Evaluator>(
        &mut self,
        engine: &StatsEngine<E>,
        key_store: &KeyStore,
    ) -> Result<()> {
        let keys = key_store.resolve(engine.evaluator().as_ref(), &self.key_id)?;
        let derived = engine.compute_blobs(&self.inputs(), &keys).map_err(|e| {
            warn!(key_id = %self.key_id, error = %e, "Run statistics not updated");
            e
        })?;
        self.apply(derived);
        Ok(())
    }

    fn apply(&mut self, derived: DerivedBlobs) {
        self.stats = Some(derived.stats);
        self.summary_output = Some(derived.summary);
        self.inference = Some(derived.inference);
    }
}

/// Running per-key-set total of run summaries
///
/// `fold` takes `&mut self`, which serializes folds within a process. Folds
/// across processes must be serialized by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeSummary {
    pub key_id: String,
    summary: Option<String>,
}

impl LifetimeSummary {
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            summary: None,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Add one run summary into the stored total
    ///
    /// The first fold adopts the run summary as-is (after checking that it
    /// parses). On error the stored value is unchanged.
    pub fn fold<E: Evaluator>(&mut self, merger: &SummaryMerger<E>, run_summary: &str) -> Result<()> {
        let merged = match &self.summary {
            Some(stored) => merger.add_blobs(run_summary, stored)?,
            None => merger.normalize(run_summary)?,
        };
        self.summary = Some(merged);
        Ok(())
    }

    /// Fold a computed run of the same key set
    pub fn fold_run<E: Evaluator>(&mut self, merger: &SummaryMerger<E>, run: &RunRecord) -> Result<()> {
        if run.key_id != self.key_id {
            return Err(StatsError::IncompatibleOperands(format!(
                "run belongs to key set {}, summary to {}",
                run.key_id, self.key_id
            )));
        }
        let summary = run.summary_output().ok_or_else(|| {
            StatsError::InvalidCiphertext("run has no computed summary to fold".to_string())
        })?;
        self.fold(merger, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::codec::{ciphertext_to_base64, encode_encrypt};
    use crate::keys::{generate_key_blobs, MemoryStore};
    use crate::params::SchemeParams;
    use crate::scheme::sim::{SimPublicKey, SimScheme};
    use crate::scheme::ClientScheme;
    use tempfile::tempdir;

    fn blob(scheme: &SimScheme, values: &[f64], pk: &SimPublicKey) -> String {
        ciphertext_to_base64(scheme, &encode_encrypt(scheme, values, pk).unwrap()).unwrap()
    }

    fn inputs(scheme: &SimScheme, pk: &SimPublicKey) -> RunBlobs {
        RunBlobs {
            position: blob(scheme, &[1.0, 2.0], pk),
            time: blob(scheme, &[0.0, 0.0], pk),
            mask: blob(scheme, &[1.0], pk),
            features: blob(scheme, &[1.0; 6], pk),
        }
    }

    #[test]
    fn test_compute_stats_fills_derived_fields() {
        let dir = tempdir().unwrap();
        let scheme = Arc::new(SimScheme::with_seed(SchemeParams::slots_256(), 4));
        let (sk, pk) = scheme.keygen().unwrap();
        let remote = MemoryStore::new();
        let store = KeyStore::new(dir.path(), Box::new(remote));
        store
            .upload("k1", &generate_key_blobs(scheme.as_ref(), &sk).unwrap())
            .unwrap();

        let engine = StatsEngine::new(scheme.clone()).unwrap();
        let mut record = RunRecord::new("k1", inputs(&scheme, &pk));
        assert!(record.stats().is_none());

        record.compute_stats(&engine, &store).unwrap();
        assert!(record.stats().is_some());
        assert!(record.summary_output().is_some());
        assert!(record.inference().is_some());
        assert_ne!(record.summary_output(), Some(record.mask_input.as_str()));
    }

    #[test]
    fn test_compute_stats_failure_keeps_record() {
        let dir = tempdir().unwrap();
        let scheme = Arc::new(SimScheme::with_seed(SchemeParams::slots_256(), 4));
        let (sk, pk) = scheme.keygen().unwrap();
        let store = KeyStore::new(dir.path(), Box::new(MemoryStore::new()));
        store
            .upload("k1", &generate_key_blobs(scheme.as_ref(), &sk).unwrap())
            .unwrap();

        let engine = StatsEngine::new(scheme.clone()).unwrap();
        let mut record = RunRecord::new("k1", inputs(&scheme, &pk));
        record.features = "AAAA".to_string();
        let before = record.clone();

        assert!(record.compute_stats(&engine, &store).is_err());
        assert_eq!(record, before);
    }

    #[test]
    fn test_fold_accumulates() {
        let scheme = Arc::new(SimScheme::with_seed(SchemeParams::slots_256(), 4));
        let (_, pk) = scheme.keygen().unwrap();
        let merger = SummaryMerger::new(scheme.clone());

        let mut lifetime = LifetimeSummary::new("k1");
        lifetime.fold(&merger, &blob(&scheme, &[1.0], &pk)).unwrap();
        let first = lifetime.summary().map(str::to_string);
        lifetime.fold(&merger, &blob(&scheme, &[2.0], &pk)).unwrap();
        assert_ne!(lifetime.summary().map(str::to_string), first);

        let before = lifetime.clone();
        assert!(lifetime.fold(&merger, "not base64").is_err());
        assert_eq!(lifetime, before);
    }

    #[test]
    fn test_fold_run_checks_key_set() {
        let scheme = Arc::new(SimScheme::with_seed(SchemeParams::slots_256(), 4));
        let (_, pk) = scheme.keygen().unwrap();
        let merger = SummaryMerger::new(scheme.clone());
        let run = RunRecord::new("other", inputs(&scheme, &pk));

        let mut lifetime = LifetimeSummary::new("k1");
        assert!(matches!(
            lifetime.fold_run(&merger, &run),
            Err(StatsError::IncompatibleOperands(_))
        ));
    }
}
