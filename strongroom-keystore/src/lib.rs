//! Key catalog: named key records, their in-memory material, and the
//! lifecycle operations over both.
//!
//! The catalog itself persists as part of the storage index document; this
//! crate owns the record type and the `<keys_dir>` PEM files, and leaves
//! writing the document to the storage layer.

mod error;
mod keystore;
mod record;

pub use error::KeystoreError;
pub use keystore::{KeyExportPackage, Keystore};
pub use record::{KeyAlgorithm, KeyMaterial, KeyRecord};
