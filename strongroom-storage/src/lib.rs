//! Persistent storage for Strongroom: the path-addressed object index,
//! the flat content-addressed blob directory, and the backup engine.
//!
//! Layout under the storage root:
//!
//! ```text
//! <storage>/
//!   internal.json        index document: key catalog + object tree
//!   <file_id>            base64(IV || ciphertext) blobs, flat
//!   keys/                PEM keypairs (owned by the keystore)
//!   backups/             storage_<ms>.zip snapshots
//! ```

mod error;
mod tree;

pub mod backup;
pub mod blob;
pub mod index;

pub use error::StoreError;
pub use index::{IndexDoc, StorageIndex, INDEX_FILE};
pub use tree::{ContentEntry, DirNode, ObjectEntry, ObjectKind};
