//! # Innate Primitives
//!
//! Hardcoded runtime constants for the procq CORE.
//!
//! These are compiled into the binary and immutable at runtime.

/// Magic bytes for the procq fragment binary format header.
///
/// File Header = Magic Bytes ("PQFG") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"PQFG";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the fragment format.
pub const FORMAT_VERSION: u8 = 1;

/// Scale for integer probability thresholds (permyriad, 1/10000).
///
/// The core is float-free; probabilities are stored as `u16` in
/// `0..=PROBABILITY_SCALE`.
pub const PROBABILITY_SCALE: u16 = 10_000;

/// Number of fan-side connector edges an Or-node requires.
pub const OR_FAN_WIDTH: usize = 2;

/// Number of trunk-side connector edges a split/join Or-node requires.
pub const OR_TRUNK_WIDTH: usize = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for an activity or object-type name.
///
/// Longer names are rejected at the catalog validation boundary.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum number of activity names on a single predicate.
pub const MAX_ACTIVITIES_PER_PREDICATE: usize = 64;

/// Maximum number of nodes accepted from a single fragment.
///
/// Graphs are bounded by on-screen node counts; this limit protects the
/// deserialization path from corrupted or malicious fragment blobs.
pub const MAX_FRAGMENT_NODES: usize = 10_000;

/// Maximum number of edges accepted from a single fragment.
pub const MAX_FRAGMENT_EDGES: usize = 50_000;

/// Maximum allowed payload size for the fragment binary format (16 MB).
///
/// Validated BEFORE deserialization to prevent allocation exhaustion.
pub const MAX_FRAGMENT_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Maximum length of a fragment store key.
pub const MAX_FRAGMENT_KEY_LENGTH: usize = 128;
