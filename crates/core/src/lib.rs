//! `crinz-core`: identifiers and domain errors shared by the feed client.
//!
//! This crate contains **pure domain** primitives (no IO, no async).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{ActionId, CommentId, ContentId, UserId};
