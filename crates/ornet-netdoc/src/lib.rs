//! Parse and represent directory objects used in the onion-routing
//! network.
//!
//! # Overview
//!
//! The directory system distributes signed text documents: router
//! descriptors (each relay's signed statement about itself),
//! network-status documents (the authorities' signed view of the whole
//! network), key certificates, extra-info documents, and a few minor
//! document kinds.  All of them share one line-oriented grammar with
//! optional base64 "objects"; this crate implements that grammar once
//! ([`parse`]) and each document type on top of it ([`doc`]).
//!
//! The parsers here validate syntax, cardinality rules, and signatures,
//! but do not decide trust: whether a signing key belongs to a real
//! directory authority is the caller's policy.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::missing_docs_in_private_items)]
// The tokenizer compares raw pointers to find token offsets; nothing is
// ever dereferenced through them.
#![allow(unsafe_code)]

#[macro_use]
pub mod parse;

pub mod doc;
mod err;
pub mod types;

pub use err::{Error, NetdocErrorKind, Pos};

/// Alias for the Result type returned by most objects in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Indicates whether we should parse an annotated list of objects or a
/// non-annotated list.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
#[allow(clippy::exhaustive_enums)]
pub enum AllowAnnotations {
    /// Parsing a document where items might be annotated.
    ///
    /// Annotations are a list of zero or more items with keywords
    /// beginning with @ that precede the items that are actually part
    /// of the document.
    AnnotationsAllowed,
    /// Parsing a document where annotations are not allowed.
    AnnotationsNotAllowed,
}
