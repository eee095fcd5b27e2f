//! Keyword rules for parsing any individual item in a document.
//!
//! Each document section is parsed against a table of [`TokenFmt`]s,
//! one per keyword: how many arguments it takes, whether it may appear
//! more than once, and whether it carries an object.

use crate::parse::keyword::Keyword;
use crate::parse::tokenize::Item;
use crate::{NetdocErrorKind as EK, Result};
use std::ops::{Bound, RangeBounds};

/// May an item of this kind have an associated object?
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ObjKind {
    /// No object is allowed.
    NoObj,
    /// An object is required.
    RequiredObj,
    /// An object is optional.
    ObjOk,
}

/// A set of restrictions to apply to Items within a section.
#[derive(Clone, Debug)]
pub(crate) struct TokenFmt<K: Keyword> {
    /// Which keyword the rule applies to.
    kwd: K,
    /// If present, a lower bound on how many arguments the item may have.
    min_args: Option<usize>,
    /// If present, an upper bound on how many arguments the item may have.
    max_args: Option<usize>,
    /// If true, the item must appear at least once.
    required: bool,
    /// If false, the item may appear at most once.
    may_repeat: bool,
    /// May this item have an object, must it, or must it not?
    obj: ObjKind,
}

impl<K: Keyword> TokenFmt<K> {
    /// Return the keyword that this rule applies to.
    pub(crate) fn kwd(&self) -> K {
        self.kwd
    }
    /// Return true if an item that obeys this rule must appear.
    pub(crate) fn required(&self) -> bool {
        self.required
    }
    /// Return true if an item that obeys this rule may appear more than
    /// once.
    pub(crate) fn may_repeat(&self) -> bool {
        self.may_repeat
    }

    /// Check whether a single Item matches this rule, with respect to
    /// its number of arguments and its object.
    pub(crate) fn check_item<'a>(&self, item: &Item<'a, K>) -> Result<()> {
        if let Some(max) = self.max_args {
            if item.n_args() > max {
                return Err(EK::TooManyArguments
                    .with_msg(self.kwd.to_str())
                    .at_pos(item.pos()));
            }
        }
        if let Some(min) = self.min_args {
            if item.n_args() < min {
                return Err(EK::TooFewArguments
                    .with_msg(self.kwd.to_str())
                    .at_pos(item.pos()));
            }
        }
        match (&self.obj, item.has_obj()) {
            (ObjKind::NoObj, true) => Err(EK::UnexpectedObject
                .with_msg(self.kwd.to_str())
                .at_pos(item.pos())),
            (ObjKind::RequiredObj, false) => Err(EK::MissingObject
                .with_msg(self.kwd.to_str())
                .at_pos(item.pos())),
            (_, _) => Ok(()),
        }
    }
}

/// Builder for a TokenFmt.
///
/// Make one of these with [`Keyword::rule`], and pass it to
/// `SectionRulesBuilder::add`.
#[derive(Clone)]
pub(crate) struct TokenFmtBuilder<K: Keyword>(TokenFmt<K>);

impl<K: Keyword> From<TokenFmtBuilder<K>> for TokenFmt<K> {
    fn from(builder: TokenFmtBuilder<K>) -> Self {
        builder.0
    }
}

impl<K: Keyword> TokenFmtBuilder<K> {
    /// Make a new TokenFmtBuilder with default behavior.
    ///
    /// (By default, all arguments are allowed, the Item may appear at
    /// most once, and it may not have an object.)
    pub(crate) fn new(t: K) -> Self {
        Self(TokenFmt {
            kwd: t,
            min_args: None,
            max_args: None,
            required: false,
            may_repeat: false,
            obj: ObjKind::NoObj,
        })
    }

    /// Indicate that this Item is required.
    #[must_use]
    pub(crate) fn required(mut self) -> Self {
        self.0.required = true;
        self
    }

    /// Indicate that this Item may appear more than once.
    #[must_use]
    pub(crate) fn may_repeat(mut self) -> Self {
        self.0.may_repeat = true;
        self
    }

    /// Indicate that this Item takes no arguments.
    #[must_use]
    pub(crate) fn no_args(mut self) -> Self {
        self.0.max_args = Some(0);
        self
    }

    /// Indicate that this Item takes a number of arguments within a
    /// given range.
    #[must_use]
    pub(crate) fn args<R: RangeBounds<usize>>(mut self, r: R) -> Self {
        self.0.min_args = match r.start_bound() {
            Bound::Included(x) => Some(*x),
            Bound::Excluded(x) => Some(*x + 1),
            Bound::Unbounded => None,
        };
        self.0.max_args = match r.end_bound() {
            Bound::Included(x) => Some(*x),
            Bound::Excluded(x) => Some(*x - 1),
            Bound::Unbounded => None,
        };
        self
    }

    /// Indicate that this Item must have an object.
    #[must_use]
    pub(crate) fn obj_required(mut self) -> Self {
        self.0.obj = ObjKind::RequiredObj;
        self
    }

    /// Indicate that this Item may have an object.
    #[must_use]
    pub(crate) fn obj_optional(mut self) -> Self {
        self.0.obj = ObjKind::ObjOk;
        self
    }
}
