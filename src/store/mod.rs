//! In-memory document and label storage.
//!
//! Stores are grouped by index name in a [`StoreCatalog`] so that several
//! loaded pipelines and the REST handlers see the same documents, the way
//! they would share an external search index.

pub mod catalog;
pub mod memory;

use thiserror::Error;

pub use catalog::StoreCatalog;
pub use memory::{DuplicatePolicy, InMemoryDocumentStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document store lock poisoned")]
    LockPoisoned,

    #[error("Document already exists: {0}")]
    DuplicateDocument(String),
}
