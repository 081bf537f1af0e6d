//! Identifier and sharded-path utilities.
//!
//! The registry addresses document entries and stored content by a *canonical* UUID
//! representation: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! This crate provides:
//! - A wrapper type ([`UuidService`]) that *guarantees* the canonical format once constructed.
//! - Shared sharding logic to derive on-disk locations from an identifier.
//! - A validated SHA-256 digest type ([`Sha256Hash`]) used for content checksums.
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, data lives under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>`
//!
//! Example:
//! `document_data/L1/entries/55/0e/550e8400e29b41d4a716446655440000.yaml`
//!
//! This scheme prevents very large fan-out in a single directory.

mod hash;
mod service;

pub use hash::Sha256Hash;
pub use service::{Uuid, UuidService};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
