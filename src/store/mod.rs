//! Transactional metadata storage for the index lifecycle

mod metadata;

pub use metadata::{DocMapping, MetadataStore, Tx};
