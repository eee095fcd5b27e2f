//! Parsing support for the network document meta-format.
//!
//! The meta-format is line-oriented: every line is a _keyword_, a list
//! of whitespace-separated arguments, and at most one base64-encoded
//! _object_ wrapped in `-----BEGIN X-----`/`-----END X-----` tags.
//! [`tokenize`] splits a document into such items; [`parser`] validates
//! a stream of items against a per-document rule table.

#[macro_use]
pub(crate) mod macros;
pub(crate) mod keyword;
pub(crate) mod parser;
pub(crate) mod rules;
pub(crate) mod tokenize;
