//! # Storage Backends
//!
//! Disk-backed persistence for named fragments.

pub mod fragment_store;

pub use fragment_store::FragmentStore;
