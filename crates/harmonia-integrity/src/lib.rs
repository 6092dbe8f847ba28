//! Harmonia integrity fingerprints.
//!
//! SHA-256 digests rendered as `sha256:<hex>`. The full digest is what gets
//! verified; the truncated form is for display next to a message or in an
//! export and must never be compared for integrity.

pub mod fingerprint;

pub use fingerprint::{
    display_truncate, fingerprint, message_fingerprint, verify, DISPLAY_HEX_LEN, PREFIX,
};
