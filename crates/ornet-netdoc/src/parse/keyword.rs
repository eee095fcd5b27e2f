//! The Keyword trait, implemented by the per-document keyword enums.

use crate::parse::rules::TokenFmtBuilder;
use std::fmt::Debug;
use std::hash::Hash;

/// A Keyword identifies the possible types of a keyword for an Item.
///
/// These do not map one-to-one to keyword strings: a keyword type may
/// cover several strings (`accept`/`reject`), and every enum carries
/// two catch-all values for unrecognized keywords and annotations.
///
/// Instances are implemented with the [`decl_keyword!`](crate::decl_keyword)
/// macro, one enum per document type.
pub(crate) trait Keyword: Hash + Eq + PartialEq + Copy + Clone + Debug {
    /// Find a Keyword corresponding to a string that appears in a
    /// network document.  Unknown strings map to the unrecognized
    /// values, never to an error.
    fn from_str(s: &str) -> Self;
    /// Try to find the keyword corresponding to a given index value,
    /// as used in [`idx`](Keyword::idx).
    fn from_idx(i: usize) -> Option<Self>;
    /// Return the canonical string for this keyword.
    fn to_str(self) -> &'static str;
    /// Return the index for this keyword.
    fn idx(self) -> usize;
    /// Return the number of indices for this keyword.
    fn n_vals() -> usize;
    /// Return true iff this keyword denotes an annotation.
    fn is_annotation(self) -> bool;
    /// Return the "unrecognized" keyword value.
    fn unrecognized() -> Self;
    /// Return the "unrecognized annotation" keyword value.
    fn ann_unrecognized() -> Self;
    /// Return a new TokenFmtBuilder for creating rules about this
    /// keyword.
    fn rule(self) -> TokenFmtBuilder<Self> {
        TokenFmtBuilder::new(self)
    }
}
