//! Key-set material and its lifecycle
//!
//! A key set is created once by the client: it keeps the secret key and
//! uploads three evaluation-key blobs to a remote store container named by
//! the key id. The server resolves those blobs through [`KeyStore`], which
//! keeps a local on-disk copy so repeated computations skip the remote.
//!
//! - [`material`]: blob names, [`KeyBlobs`] and deserialized [`KeyMaterial`]
//! - [`remote`]: the [`RemoteStore`] seam and its implementations
//! - [`cache`]: the on-disk cache with all-or-nothing entries
//! - [`KeyStore`]: cache + remote with per-key serialization

pub mod cache;
pub mod material;
pub mod remote;
mod store;

pub use cache::{CacheLookup, KeyCache};
pub use material::{
    generate_key_blobs, validate_key_id, KeyBlobs, KeyMaterial, GALOIS_BLOB,
    GALOIS_SINGLE_STEP_BLOB, RELIN_BLOB,
};
#[cfg(feature = "server")]
pub use remote::HttpStore;
pub use remote::{DirectoryStore, MemoryStore, RemoteStore};
pub use store::KeyStore;
