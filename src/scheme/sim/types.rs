//! Object types of the reference backend

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Batched ciphertext
///
/// `tag` identifies the key set the ciphertext was encrypted under; `size`
/// is 2 for a regular ciphertext and 3 after an unrelinearized multiply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimCiphertext {
    pub(crate) tag: u64,
    pub(crate) slot_count: usize,
    pub(crate) size: u8,
    pub(crate) depth: u32,
    pub(crate) slots: Vec<f64>,
}

impl SimCiphertext {
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    /// Multiplicative depth consumed so far
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimPlaintext {
    pub(crate) slots: Vec<f64>,
}

impl SimPlaintext {
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Rotation key set, identified by its Galois elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimGaloisKeys {
    pub(crate) tag: u64,
    pub(crate) slot_count: usize,
    pub(crate) elements: BTreeSet<usize>,
}

impl SimGaloisKeys {
    pub fn elements(&self) -> &BTreeSet<usize> {
        &self.elements
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimRelinKeys {
    pub(crate) tag: u64,
    pub(crate) slot_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSecretKey {
    pub(crate) tag: u64,
    pub(crate) slot_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimPublicKey {
    pub(crate) tag: u64,
    pub(crate) slot_count: usize,
}
