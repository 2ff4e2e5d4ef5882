//! # Serialization Formats
//!
//! Pure byte-level formats for fragments. File and database I/O live in
//! the app layer and in `storage`.

pub mod persistence;

pub use persistence::{FragmentHeader, fragment_from_bytes, fragment_to_bytes};
