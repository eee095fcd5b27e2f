//! Error type from parsing a document, and the position where it occurred.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A position within a directory object.  Used to tell where an error
/// occurred.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum Pos {
    /// The error did not occur at any particular position.
    ///
    /// This happens when (for example) an entry is missing: it was
    /// supposed to go _somewhere_, but we can't say where.
    None,
    /// The error occurred at an unknown position.
    Unknown,
    /// The error occurred at an invalid offset within the string, or
    /// outside the string entirely.  Only an internal error produces this.
    Invalid(usize),
    /// The error occurred at a particular byte within the string.
    ///
    /// We convert these to a PosInLine before displaying them.
    Byte {
        /// Byte offset within a string.
        off: usize,
    },
    /// The error occurred at a particular line (and possibly a byte
    /// within it).
    PosInLine {
        /// Line offset within a string.
        line: usize,
        /// Byte offset within the line.
        byte: usize,
    },
    /// The error occurred at a position in memory.  This is mapped to a
    /// position within the document before the user sees it.
    Raw {
        /// A pointer to the position where the error occurred.
        ///
        /// Never dereferenced; only compared against the extent of a
        /// containing string.
        ptr: *const u8,
    },
}

// A raw pointer makes Pos !Send, but we never dereference it: it is only
// ever compared against the bounds of a string we hold.
unsafe impl Send for Pos {}
unsafe impl Sync for Pos {}

impl Pos {
    /// Construct a Pos from an offset within a &str slice.
    pub fn from_offset(s: &str, off: usize) -> Self {
        if off > s.len() || !s.is_char_boundary(off) {
            Pos::Invalid(off)
        } else {
            let s = &s[..off];
            match s.rfind('\n') {
                Some(pos) => {
                    let newlines = s.bytes().filter(|b| *b == b'\n').count();
                    Pos::PosInLine {
                        line: newlines + 1,
                        byte: off - pos,
                    }
                }
                None => Pos::PosInLine {
                    line: 1,
                    byte: off + 1,
                },
            }
        }
    }
    /// Construct a Pos from a slice of some other string.  Not useful
    /// until it is mapped into the containing string with `within`.
    pub fn at(s: &str) -> Self {
        let ptr = s.as_ptr();
        Pos::Raw { ptr }
    }
    /// Construct a Pos from the end of some other string.
    pub fn at_end_of(s: &str) -> Self {
        let ending = &s[s.len()..];
        Pos::at(ending)
    }
    /// Construct a position from a byte offset.
    pub fn from_byte(off: usize) -> Self {
        Pos::Byte { off }
    }
    /// Construct a position from a line and byte offset within that line.
    pub fn from_line(line: usize, byte: usize) -> Self {
        Pos::PosInLine { line, byte }
    }
    /// If this position appears within `s` and has not yet been mapped,
    /// return its byte offset.
    pub(crate) fn offset_within(&self, s: &str) -> Option<usize> {
        match self {
            Pos::Byte { off } => Some(*off),
            Pos::Raw { ptr } => offset_in(*ptr, s),
            _ => None,
        }
    }
    /// Convert a byte-based or pointer-based position to a line-and-byte
    /// position within `s`.
    ///
    /// The position must have been generated from `s`, or the result
    /// will be nonsense.
    #[must_use]
    pub fn within(self, s: &str) -> Self {
        match self {
            Pos::Byte { off } => Self::from_offset(s, off),
            Pos::Raw { ptr } => {
                if let Some(off) = offset_in(ptr, s) {
                    Self::from_offset(s, off)
                } else {
                    self
                }
            }
            _ => self,
        }
    }
}

/// If `ptr` is within `s`, return its byte offset.
fn offset_in(ptr: *const u8, s: &str) -> Option<usize> {
    // We must confirm that `ptr` falls inside `s` before subtracting;
    // otherwise the result would be bogus (though never unsafe).
    let ptr_u = ptr as usize;
    let start_u = s.as_ptr() as usize;
    let end_u = start_u + s.len();
    if start_u <= ptr_u && ptr_u < end_u {
        Some(ptr_u - start_u)
    } else {
        None
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Pos::*;
        match self {
            None => write!(f, ""),
            Unknown => write!(f, " at unknown position"),
            Invalid(off) => write!(f, " at invalid offset at index {}", off),
            Byte { off } => write!(f, " at byte {}", off),
            PosInLine { line, byte } => write!(f, " on line {}, byte {}", line, byte),
            Raw { ptr } => write!(f, " at {:?}", ptr),
        }
    }
}

/// A variety of parsing error.
#[derive(Copy, Clone, Debug, derive_more::Display, PartialEq, Eq)]
#[non_exhaustive]
pub enum NetdocErrorKind {
    /// An internal error in the parser: these should never happen.
    #[display("internal error")]
    Internal,
    /// An entry was found with no keyword.
    #[display("no keyword for entry")]
    MissingKeyword,
    /// An entry was found with no newline at the end.
    #[display("line truncated before newline")]
    TruncatedLine,
    /// A bad string was found in the keyword position.
    #[display("invalid keyword")]
    BadKeyword,
    /// We found an ill-formed "BEGIN FOO" tag.
    #[display("invalid object BEGIN tag")]
    BadObjectBeginTag,
    /// We found an ill-formed "END FOO" tag.
    #[display("invalid object END tag")]
    BadObjectEndTag,
    /// We found a "BEGIN FOO" whose "END FOO" tag didn't match.
    #[display("mismatched object tags")]
    BadObjectMismatchedTag,
    /// We found a base64 object with an invalid encoding.
    #[display("invalid base64 in object")]
    BadObjectBase64,
    /// The document had more than one of an entry it may have only once.
    #[display("duplicate entry")]
    DuplicateToken,
    /// The document had an entry it is not allowed to contain.
    #[display("unexpected entry")]
    UnexpectedToken,
    /// The document was missing a required entry.
    #[display("didn't find required entry")]
    MissingToken,
    /// An entry appeared in a place it is not allowed.
    #[display("entry out of place")]
    MisplacedToken,
    /// An entry had more arguments than it is allowed to have.
    #[display("too many arguments")]
    TooManyArguments,
    /// An entry had too few arguments.
    #[display("too few arguments")]
    TooFewArguments,
    /// An entry had an object it is not allowed to have.
    #[display("unexpected object")]
    UnexpectedObject,
    /// An entry was missing a required object.
    #[display("missing object")]
    MissingObject,
    /// An entry's object had the wrong tag.
    #[display("wrong object type")]
    WrongObject,
    /// An argument that was safely expected was missing.
    ///
    /// Correct code catches this earlier, as TooFewArguments.
    #[display("missing argument")]
    MissingArgument,
    /// An argument could not be parsed.
    #[display("bad argument for entry")]
    BadArgument,
    /// An object could not be parsed after it was decoded.
    #[display("bad object for entry")]
    BadObjectVal,
    /// A signature did not validate.
    #[display("couldn't validate signature")]
    BadSignature,
    /// A version string could not be parsed.
    #[display("couldn't parse version")]
    BadVersion,
    /// An exit-policy entry could not be parsed.
    #[display("invalid policy entry")]
    BadPolicy,
    /// A timestamp was outside the expected form or range.
    #[display("invalid time")]
    BadTimeBound,
    /// A versioned document had a version we don't support.
    #[display("unrecognized document version")]
    BadDocumentVersion,
    /// A document was empty where content was required.
    #[display("empty line")]
    EmptyLine,
    /// The whole document was of a type we don't recognize.
    #[display("unrecognized document type")]
    BadDocumentType,
}

impl NetdocErrorKind {
    /// Construct a new Error with this kind.
    #[must_use]
    pub(crate) fn err(self) -> Error {
        Error {
            kind: self,
            msg: None,
            pos: Pos::Unknown,
            source: None,
        }
    }

    /// Construct a new error with this kind at a given position.
    #[must_use]
    pub(crate) fn at_pos(self, pos: Pos) -> Error {
        self.err().at_pos(pos)
    }

    /// Construct a new error with this kind and a given message.
    #[must_use]
    pub(crate) fn with_msg<T>(self, msg: T) -> Error
    where
        T: Into<Cow<'static, str>>,
    {
        self.err().with_msg(msg)
    }
}

/// An error that occurred while parsing a directory object of some kind.
#[derive(Debug, Clone)]
pub struct Error {
    /// What kind of error occurred.
    kind: NetdocErrorKind,
    /// Do we have more information about the error?
    msg: Option<Cow<'static, str>>,
    /// Where did the error occur?
    pos: Pos,
    /// Was this caused by another error?
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

// Ignore `source` for equality: it exists for human diagnostics only.
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.msg == other.msg && self.pos == other.pos
    }
}
impl Eq for Error {}

impl Error {
    /// Return the position of this error, if any.
    pub fn pos(&self) -> Pos {
        self.pos
    }
    /// Return the kind of this error.
    pub fn netdoc_error_kind(&self) -> NetdocErrorKind {
        self.kind
    }
    /// Return a new error based on this one, with the position replaced.
    #[must_use]
    pub fn at_pos(mut self, pos: Pos) -> Self {
        self.pos = pos;
        self
    }
    /// Return a new error based on this one, with the position replaced
    /// only if it had no position before.
    #[must_use]
    pub fn or_at_pos(mut self, pos: Pos) -> Self {
        match self.pos {
            Pos::None | Pos::Unknown => {
                self.pos = pos;
            }
            _ => (),
        }
        self
    }
    /// Return a new error based on this one, with a message attached.
    #[must_use]
    pub fn with_msg<T>(mut self, msg: T) -> Self
    where
        T: Into<Cow<'static, str>>,
    {
        self.msg = Some(msg.into());
        self
    }
    /// Return a new error based on this one, with a source attached.
    #[must_use]
    pub fn with_source<T>(mut self, source: T) -> Self
    where
        T: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }
    /// Return this error with its position translated to a line-and-byte
    /// position within `s`.
    ///
    /// The error must have occurred within `s`; otherwise the position
    /// will be nonsense.
    #[must_use]
    pub fn within(mut self, s: &str) -> Self {
        self.pos = self.pos.within(s);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.pos)?;
        if let Some(msg) = &self.msg {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Error {
        NetdocErrorKind::BadArgument.err().with_source(e)
    }
}

impl From<std::net::AddrParseError> for Error {
    fn from(e: std::net::AddrParseError) -> Error {
        NetdocErrorKind::BadArgument.err().with_source(e)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(e: std::convert::Infallible) -> Error {
        match e {}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pos_mapping() {
        let s = "first line\nsecond line\nthird";
        assert_eq!(Pos::from_offset(s, 0), Pos::from_line(1, 1));
        assert_eq!(Pos::from_offset(s, 3), Pos::from_line(1, 4));
        assert_eq!(Pos::from_offset(s, 11), Pos::from_line(2, 1));
        let sub = &s[23..];
        assert_eq!(Pos::at(sub).within(s), Pos::from_line(3, 1));
        assert!(matches!(Pos::from_offset(s, 9999), Pos::Invalid(_)));
    }

    #[test]
    fn errors_compare_without_source() {
        let e1 = NetdocErrorKind::BadArgument
            .at_pos(Pos::from_line(3, 1))
            .with_msg("off by one");
        let e2 = NetdocErrorKind::BadArgument
            .at_pos(Pos::from_line(3, 1))
            .with_msg("off by one")
            .with_source(std::str::from_utf8(&[0xff]).unwrap_err());
        assert_eq!(e1, e2);
        assert_ne!(e1, e1.clone().at_pos(Pos::from_line(4, 1)));
        assert_eq!(
            e1.to_string(),
            "bad argument for entry on line 3, byte 1: off by one"
        );
    }
}
