//! # Fragment Persistence Format
//!
//! Binary serialization for graph fragments.
//!
//! Format: Header (5 bytes) + postcard-serialized fragment data.
//! - 4 bytes: Magic ("PQFG")
//! - 1 byte: Version
//!
//! Untrusted input is validated before deserialization: payload size is
//! capped, the header is checked first, and node/edge counts are bounded
//! after decoding.

use crate::{Fragment, ProcqError, primitives};

/// Minimum valid data size (header only).
const MIN_DATA_SIZE: usize = 5;

// =============================================================================
// HEADER
// =============================================================================

/// The fragment header precedes all payload data.
#[derive(Debug, Clone, Copy)]
pub struct FragmentHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl FragmentHeader {
    /// Create a new header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), ProcqError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(ProcqError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(ProcqError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write the header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read a header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProcqError> {
        if bytes.len() < MIN_DATA_SIZE {
            return Err(ProcqError::SerializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for FragmentHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a fragment to bytes (header + payload). Pure transformation,
/// no file I/O.
pub fn fragment_to_bytes(fragment: &Fragment) -> Result<Vec<u8>, ProcqError> {
    validate_limits(fragment)?;
    let header = FragmentHeader::new();

    let payload =
        postcard::to_stdvec(fragment).map_err(|e| ProcqError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(MIN_DATA_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize a fragment from bytes.
///
/// Size and header are validated before the payload is touched; node and
/// edge counts are bounded after decoding.
pub fn fragment_from_bytes(bytes: &[u8]) -> Result<Fragment, ProcqError> {
    if bytes.len() < MIN_DATA_SIZE {
        return Err(ProcqError::SerializationError(
            "Data too short: minimum 5 bytes required".to_string(),
        ));
    }
    if bytes.len() > primitives::MAX_FRAGMENT_PAYLOAD_SIZE {
        return Err(ProcqError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            primitives::MAX_FRAGMENT_PAYLOAD_SIZE
        )));
    }

    let header = FragmentHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = &bytes[MIN_DATA_SIZE..];
    let fragment: Fragment = postcard::from_bytes(payload).map_err(|e| {
        ProcqError::SerializationError(format!("Failed to deserialize fragment data: {e}"))
    })?;

    validate_limits(&fragment)?;
    Ok(fragment)
}

/// Bound the fragment's node and edge counts.
fn validate_limits(fragment: &Fragment) -> Result<(), ProcqError> {
    if fragment.nodes.len() > primitives::MAX_FRAGMENT_NODES {
        return Err(ProcqError::SerializationError(format!(
            "Fragment node count {} exceeds maximum {}",
            fragment.nodes.len(),
            primitives::MAX_FRAGMENT_NODES
        )));
    }
    if fragment.edges.len() > primitives::MAX_FRAGMENT_EDGES {
        return Err(ProcqError::SerializationError(format!(
            "Fragment edge count {} exceeds maximum {}",
            fragment.edges.len(),
            primitives::MAX_FRAGMENT_EDGES
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
