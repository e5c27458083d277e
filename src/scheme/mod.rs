//! Homomorphic scheme capability interface
//!
//! The statistics engine never touches scheme internals. It is written
//! against two traits:
//!
//! - [`Evaluator`]: everything the server needs. Encoding of plaintext
//!   constants, slot-wise add/sub/multiply, relinearization, slot rotation
//!   and (de)serialization of ciphertexts and evaluation keys.
//! - [`ClientScheme`]: the key holder's side. Key generation, encryption,
//!   decryption and decoding.
//!
//! # Rotation keys
//!
//! Rotating a batched ciphertext left by `k` slots is the Galois automorphism
//! X → X^(3^k mod 2N). A rotation key set is therefore a set of Galois
//! elements; see [`galois`] for the bookkeeping. Two sets are used:
//!
//! - the *general* set with one element per power-of-two step, from which
//!   any rotation is composed
//! - the *single-step* set holding only the element 3
//!
//! # Example
//!
//! ```
//! use runstat::params::SchemeParams;
//! use runstat::scheme::{ClientScheme, Evaluator};
//! use runstat::scheme::sim::SimScheme;
//!
//! let scheme = SimScheme::with_seed(SchemeParams::slots_256(), 7);
//! let (sk, pk) = scheme.keygen().unwrap();
//! let galois = scheme.power_of_two_galois_keys(&sk).unwrap();
//!
//! let pt = scheme.encode(&[1.0, 2.0, 3.0]).unwrap();
//! let ct = scheme.encrypt(&pt, &pk).unwrap();
//! let rotated = scheme.rotate(&ct, 1, &galois).unwrap();
//! let slots = scheme.decode(&scheme.decrypt(&rotated, &sk).unwrap()).unwrap();
//! assert!((slots[0] - 2.0).abs() < 1e-5);
//! ```

pub mod galois;
pub mod sim;

use crate::error::Result;
use crate::params::SchemeParams;

/// Server-side homomorphic operations
///
/// Implementations must be usable from several threads at once; the engine
/// evaluates independent branches in parallel.
pub trait Evaluator: Send + Sync {
    type Ciphertext: Clone + Send + Sync;
    type Plaintext: Clone + Send + Sync;
    type GaloisKeys: Send + Sync;
    type RelinKeys: Send + Sync;

    fn params(&self) -> &SchemeParams;

    fn slot_count(&self) -> usize {
        self.params().slot_count
    }

    /// Encode reals into a plaintext, zero-padding to the slot count
    ///
    /// Fails with [`StatsError::Size`](crate::error::StatsError::Size) when
    /// `values` is longer than the slot count.
    fn encode(&self, values: &[f64]) -> Result<Self::Plaintext>;

    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    fn sub(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    fn add_plain(&self, a: &Self::Ciphertext, p: &Self::Plaintext) -> Result<Self::Ciphertext>;

    /// Ciphertext product; the result has size 3 until relinearized
    fn multiply(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    fn multiply_plain(&self, a: &Self::Ciphertext, p: &Self::Plaintext)
        -> Result<Self::Ciphertext>;

    fn relinearize(&self, a: &Self::Ciphertext, keys: &Self::RelinKeys)
        -> Result<Self::Ciphertext>;

    /// Cyclic left rotation: `result[i] = a[(i + steps) mod slot_count]`
    fn rotate(
        &self,
        a: &Self::Ciphertext,
        steps: usize,
        keys: &Self::GaloisKeys,
    ) -> Result<Self::Ciphertext>;

    fn save_ciphertext(&self, ct: &Self::Ciphertext) -> Result<Vec<u8>>;
    fn load_ciphertext(&self, bytes: &[u8]) -> Result<Self::Ciphertext>;

    fn save_galois_keys(&self, keys: &Self::GaloisKeys) -> Result<Vec<u8>>;
    fn load_galois_keys(&self, bytes: &[u8]) -> Result<Self::GaloisKeys>;

    fn save_relin_keys(&self, keys: &Self::RelinKeys) -> Result<Vec<u8>>;
    fn load_relin_keys(&self, bytes: &[u8]) -> Result<Self::RelinKeys>;
}

/// Key holder operations
pub trait ClientScheme: Evaluator {
    type SecretKey;
    type PublicKey;

    fn keygen(&self) -> Result<(Self::SecretKey, Self::PublicKey)>;

    fn encrypt(&self, pt: &Self::Plaintext, pk: &Self::PublicKey) -> Result<Self::Ciphertext>;

    /// Fails with `InvalidCiphertext` when `ct` was not produced under `sk`
    fn decrypt(&self, ct: &Self::Ciphertext, sk: &Self::SecretKey) -> Result<Self::Plaintext>;

    fn decode(&self, pt: &Self::Plaintext) -> Result<Vec<f64>>;

    /// Rotation keys for exactly the given Galois elements
    fn galois_keys(&self, sk: &Self::SecretKey, elements: &[usize]) -> Result<Self::GaloisKeys>;

    fn relin_keys(&self, sk: &Self::SecretKey) -> Result<Self::RelinKeys>;

    fn save_secret_key(&self, sk: &Self::SecretKey) -> Result<Vec<u8>>;
    fn load_secret_key(&self, bytes: &[u8]) -> Result<Self::SecretKey>;

    fn save_public_key(&self, pk: &Self::PublicKey) -> Result<Vec<u8>>;
    fn load_public_key(&self, bytes: &[u8]) -> Result<Self::PublicKey>;

    /// General rotation set: one element per power-of-two step
    fn power_of_two_galois_keys(&self, sk: &Self::SecretKey) -> Result<Self::GaloisKeys> {
        let elements = galois::power_of_two_elements(self.slot_count());
        self.galois_keys(sk, &elements)
    }

    /// Single-step rotation set
    fn single_step_galois_keys(&self, sk: &Self::SecretKey) -> Result<Self::GaloisKeys> {
        let element = galois::rotation_element(1, self.slot_count());
        self.galois_keys(sk, &[element])
    }
}
