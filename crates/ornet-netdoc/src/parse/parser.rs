//! Based on a set of rules, validate a token stream and collect the
//! tokens by type.
//!
//! See [`SectionRules`] for the main entry point.

use crate::parse::keyword::Keyword;
use crate::parse::rules::{TokenFmt, TokenFmtBuilder};
use crate::parse::tokenize::{Item, MaybeItem};
use crate::{NetdocErrorKind as EK, Result};

/// The collected tokens of one keyword type within a section.
///
/// Empty when the keyword did not appear.
#[derive(Clone, Debug)]
struct TokVal<'a, K: Keyword>(Vec<Item<'a, K>>);

impl<'a, K: Keyword> Default for TokVal<'a, K> {
    fn default() -> Self {
        TokVal(Vec::new())
    }
}

impl<'a, K: Keyword> TokVal<'a, K> {
    /// Return the number of Items for this value.
    fn count(&self) -> usize {
        self.0.len()
    }
    /// Return the first Item for this value, if any.
    fn first(&self) -> Option<&Item<'a, K>> {
        self.0.first()
    }
    /// Return the Items for this value, as a slice.
    fn as_slice(&self) -> &[Item<'a, K>] {
        &self.0
    }
    /// Return the last Item for this value, if any.
    fn last(&self) -> Option<&Item<'a, K>> {
        self.0.last()
    }
}

/// A Section is the result of sorting a document's entries by keyword.
///
/// TODO: I'd rather have this be pub(crate), but I haven't figured out
/// how to make that work; there are some error-related methods that
/// sections need to expose.
#[derive(Debug)]
pub(crate) struct Section<'a, K: Keyword> {
    /// Map from Keyword index to TokVal.
    v: Vec<TokVal<'a, K>>,
    /// The keyword that appeared first in this section.
    first: Option<K>,
    /// The keyword that appeared last in this section.
    last: Option<K>,
}

impl<'a, K: Keyword> Section<'a, K> {
    /// Make a new empty Section.
    fn new() -> Self {
        let n = K::n_vals();
        let mut v = Vec::with_capacity(n);
        v.resize_with(n, TokVal::default);
        Section {
            v,
            first: None,
            last: None,
        }
    }
    /// Helper: return the tokval for some Keyword.
    fn tokval(&self, t: K) -> &TokVal<'a, K> {
        let idx = t.idx();
        &self.v[idx]
    }
    /// Return all the Items for some Keyword, as a slice.
    pub(crate) fn slice(&self, t: K) -> &[Item<'a, K>] {
        self.tokval(t).as_slice()
    }
    /// Return a single Item for some Keyword, if there is exactly one.
    pub(crate) fn get(&self, t: K) -> Option<&Item<'a, K>> {
        self.tokval(t).first()
    }
    /// Return a single Item for some Keyword, giving an error if there
    /// is not exactly one.
    ///
    /// It is usually a mistake to use this function on a Keyword that
    /// is not required.
    pub(crate) fn required(&self, t: K) -> Result<&Item<'a, K>> {
        self.get(t)
            .ok_or_else(|| EK::MissingToken.with_msg(t.to_str()))
    }
    /// Return a proxy MaybeItem object for some keyword.
    ///
    /// A MaybeItem is used to represent an object that might or might
    /// not be there.
    pub(crate) fn maybe<'b>(&'b self, t: K) -> MaybeItem<'b, 'a, K> {
        MaybeItem::from_option(self.get(t))
    }
    /// Return the first item that was accepted for this section, or
    /// None if no items were accepted.
    pub(crate) fn first_item(&self) -> Option<&Item<'a, K>> {
        match self.first {
            None => None,
            Some(t) => self.tokval(t).first(),
        }
    }
    /// Return the last item that was accepted for this section, or
    /// None if no items were accepted.
    pub(crate) fn last_item(&self) -> Option<&Item<'a, K>> {
        match self.last {
            None => None,
            Some(t) => self.tokval(t).last(),
        }
    }
    /// Insert an `item`.
    ///
    /// The `item` must have parsed Keyword `t`.
    fn add_tok(&mut self, t: K, item: Item<'a, K>) {
        let idx = Keyword::idx(t);
        self.v[idx].0.push(item);
        if self.first.is_none() {
            self.first = Some(t);
        }
        self.last = Some(t);
    }
}

/// A builder for a set of section rules.
#[derive(Clone)]
pub(crate) struct SectionRulesBuilder<K: Keyword> {
    /// Have we been told, explicitly, to reject unrecognized tokens?
    strict: bool,
    /// The rules we're building.
    rules: Vec<Option<TokenFmt<K>>>,
}

impl<K: Keyword> SectionRulesBuilder<K> {
    /// Add a rule to this SectionRulesBuilder, based on a
    /// TokenFmtBuilder.
    ///
    /// Requires that no rule yet exists for the provided keyword.
    pub(crate) fn add(&mut self, t: TokenFmtBuilder<K>) {
        let rule: TokenFmt<_> = t.into();
        let idx = rule.kwd().idx();
        assert!(self.rules[idx].is_none(), "duplicate rule for keyword");
        self.rules[idx] = Some(rule);
    }

    /// Explicitly reject any unrecognized tokens.
    ///
    /// To avoid errors, you must either explicitly reject unrecognized
    /// tokens, or you must define how they are handled.
    pub(crate) fn reject_unrecognized(&mut self) {
        self.strict = true;
    }

    /// Construct the SectionRules from this builder.
    ///
    /// # Panics
    ///
    /// Panics if you did not specify the behavior for unrecognized
    /// tokens, with either `reject_unrecognized` or by adding a rule
    /// for the unrecognized keyword.
    pub(crate) fn build(self) -> SectionRules<K> {
        let unrecognized_idx = K::unrecognized().idx();
        assert!(
            self.strict || self.rules[unrecognized_idx].is_some(),
            "BUG: section has no policy for unrecognized tokens."
        );
        SectionRules { rules: self.rules }
    }
}

/// A set of rules for validating a single section of a document.
///
/// Each Keyword of the document's type has a rule for how often it may
/// appear, and what it must look like when it does.
#[derive(Clone)]
pub(crate) struct SectionRules<K: Keyword> {
    /// A set of rules for decoding a series of tokens into a Section
    /// object.  Each element of this array corresponds to the
    /// Keyword with the corresponding index values.
    ///
    /// A None means "Keyword not allowed" and a Some(TokenFmt)
    /// means "Keyword allowed, provided it follows these rules".
    rules: Vec<Option<TokenFmt<K>>>,
}

impl<K: Keyword> SectionRules<K> {
    /// Create a new builder for a SectionRules with no rules.
    ///
    /// By default, no Keyword is allowed by this SectionRules.
    pub(crate) fn builder() -> SectionRulesBuilder<K> {
        let n = K::n_vals();
        let mut rules = Vec::with_capacity(n);
        rules.resize(n, None);
        SectionRulesBuilder {
            strict: false,
            rules,
        }
    }

    /// Parse a stream of tokens into a Section object without (fully)
    /// verifying them.
    ///
    /// Some errors are detected early: unrecognized or misplaced
    /// keywords, repeated tokens that may not repeat, and malformed
    /// individual items.  Cardinality rules ("required") are enforced
    /// afterwards, in validate().
    fn parse_unverified<'a, I>(&self, tokens: I, section: &mut Section<'a, K>) -> Result<()>
    where
        I: Iterator<Item = Result<Item<'a, K>>>,
    {
        for item in tokens {
            let item = item?;

            let tok = item.kwd();
            let tok_idx = tok.idx();
            if let Some(rule) = &self.rules[tok_idx] {
                // We want this token.
                assert!(rule.kwd() == tok);
                section.add_tok(tok, item);
            } else {
                // We don't have a rule for this token.
                return Err(EK::UnexpectedToken
                    .with_msg(tok.to_str())
                    .at_pos(item.pos()));
            }
        }
        Ok(())
    }

    /// Check whether the tokens in a section we've parsed conform to
    /// these rules.
    fn validate<'a>(&self, s: &Section<'a, K>) -> Result<()> {
        // These vectors are both generated from K::n_vals().
        assert_eq!(s.v.len(), self.rules.len());

        for (rule, t) in self.rules.iter().zip(s.v.iter()) {
            match rule {
                None => {
                    // We already tested for this in parse_unverified,
                    // but repeating the check makes the invariant local.
                    if t.count() > 0 {
                        unreachable!("disallowed token was accepted earlier");
                    }
                }
                Some(rule) => {
                    let count = t.count();
                    if count > 1 && !rule.may_repeat() {
                        // This unwrap is safe because count > 1.
                        #[allow(clippy::unwrap_used)]
                        return Err(EK::DuplicateToken
                            .with_msg(rule.kwd().to_str())
                            .at_pos(t.as_slice().get(1).unwrap().pos()));
                    }
                    if rule.required() && count == 0 {
                        return Err(EK::MissingToken.with_msg(rule.kwd().to_str()));
                    }
                    for item in t.as_slice() {
                        rule.check_item(item)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Parse a stream of tokens into a validated section.
    pub(crate) fn parse<'a, I>(&self, tokens: I) -> Result<Section<'a, K>>
    where
        I: Iterator<Item = Result<Item<'a, K>>>,
    {
        let mut section = Section::new();
        self.parse_unverified(tokens, &mut section)?;
        self.validate(&section)?;
        Ok(section)
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::SectionRules;
    use crate::parse::keyword::Keyword;
    use crate::parse::macros::test::Fruit;
    use crate::parse::tokenize::{Item, NetDocReader};
    use crate::{NetdocErrorKind as EK, Result};
    use std::sync::LazyLock;

    /// Rule set used by the tests below.
    static FRUIT_SALAD: LazyLock<SectionRules<Fruit>> = LazyLock::new(|| {
        use Fruit::*;
        let mut rules = SectionRules::builder();
        rules.add(ANN_TASTY.rule().required().args(1..=1));
        rules.add(ORANGE.rule().args(1..));
        rules.add(STONEFRUIT.rule().may_repeat());
        rules.add(GUAVA.rule().obj_optional());
        rules.add(LEMON.rule().no_args().obj_required());
        rules.reject_unrecognized();
        rules.build()
    });

    fn parse_fruit(s: &str) -> Result<super::Section<'_, Fruit>> {
        let mut reader: NetDocReader<'_, Fruit> = NetDocReader::new(s);
        let res = FRUIT_SALAD.parse(&mut reader)?;
        reader.should_be_exhausted()?;
        Ok(res)
    }

    #[test]
    fn parse_section() {
        use Fruit::*;
        let s = "\
@tasty yes
orange soda
cherry cobbler
cherry pie
plum compote
guava juice
-----BEGIN GUAVA-----
eSB0aGlzIGlzIGEgZ29vZCBleGFtcGxlCg==
-----END GUAVA-----
";
        let sec = parse_fruit(s).unwrap();

        assert_eq!(sec.required(ANN_TASTY).unwrap().arg(0), Some("yes"));
        assert_eq!(sec.get(ORANGE).unwrap().args_as_str(), "soda");
        let stonefruit_slice = sec.slice(STONEFRUIT);
        assert_eq!(stonefruit_slice.len(), 3);
        let kwds: Vec<&str> = stonefruit_slice.iter().map(Item::kwd_str).collect();
        assert_eq!(kwds, &["cherry", "cherry", "plum"]);

        assert_eq!(sec.maybe(GUAVA).args_as_str(), Some("juice"));
        assert!(sec.get(LEMON).is_none());
        assert!(sec.maybe(LEMON).args_as_str().is_none());

        assert_eq!(sec.first_item().unwrap().kwd(), ANN_TASTY);
        assert_eq!(sec.last_item().unwrap().kwd(), GUAVA);
    }

    #[test]
    fn rejected_sections() {
        // Missing required annotation.
        let e = parse_fruit("orange foo\n").unwrap_err();
        assert_eq!(e, EK::MissingToken.with_msg("@tasty"));

        // Wrong number of arguments.
        let e = parse_fruit("@tasty yes indeed\n").unwrap_err();
        assert_eq!(e.netdoc_error_kind(), EK::TooManyArguments);

        // A token that may not repeat, repeated.
        let e = parse_fruit("@tasty yes\norange a\norange b\n").unwrap_err();
        assert_eq!(e.netdoc_error_kind(), EK::DuplicateToken);

        // An unrecognized token, with no policy for unrecognized tokens.
        let e = parse_fruit("@tasty yes\nrambutan\n").unwrap_err();
        assert_eq!(e.netdoc_error_kind(), EK::UnexpectedToken);

        // A missing object.
        let e = parse_fruit("@tasty yes\nlemon\n").unwrap_err();
        assert_eq!(e.netdoc_error_kind(), EK::MissingObject);

        // An unexpected object.
        let s = "\
@tasty yes
orange soda
-----BEGIN ORANGE-----
eSB0aGlzIGlzIGEgZ29vZCBleGFtcGxlCg==
-----END ORANGE-----
";
        let e = parse_fruit(s).unwrap_err();
        assert_eq!(e.netdoc_error_kind(), EK::UnexpectedObject);
    }
}
