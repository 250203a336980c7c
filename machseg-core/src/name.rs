use std::fmt;
use std::hash::{Hash, Hasher};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Width of the name fields in Mach-O segment and section records.
pub const NAME_LEN: usize = 16;

/// A fixed-width name field as stored in a segment or section record.
///
/// The field is conventionally padded with zero bytes, but a name that uses
/// all sixteen bytes carries no terminator at all. Only the bytes before the
/// first zero (or the whole field, when there is none) are meaningful; equality
/// and hashing ignore whatever follows.
#[repr(transparent)]
#[derive(Clone, Copy, Default, FromBytes, KnownLayout, Immutable)]
pub struct FixedName([u8; NAME_LEN]);

impl FixedName {
    /// Builds a zero-padded field from `name`.
    ///
    /// Returns `None` when the meaningful part of `name` does not fit.
    pub fn new(name: &[u8]) -> Option<Self> {
        let name = meaningful(name);
        if name.len() > NAME_LEN {
            return None;
        }
        let mut raw = [0u8; NAME_LEN];
        raw[..name.len()].copy_from_slice(name);
        Some(Self(raw))
    }

    /// The meaningful bytes: everything before the first zero byte.
    pub fn as_bytes(&self) -> &[u8] {
        meaningful(&self.0)
    }

    /// Compares the field against a caller-supplied name.
    ///
    /// `name` is cut at its own first zero byte, so both C-style terminated
    /// and plain byte strings work. A name longer than the field never matches.
    pub fn matches(&self, name: &[u8]) -> bool {
        let name = meaningful(name);
        name.len() <= NAME_LEN && self.as_bytes() == name
    }
}

/// Cuts `bytes` at the first zero byte.
pub(crate) fn meaningful(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// True when `name` could ever match a [`FixedName`].
pub(crate) fn fits(name: &[u8]) -> bool {
    meaningful(name).len() <= NAME_LEN
}

impl PartialEq for FixedName {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for FixedName {}

impl PartialEq<[u8]> for FixedName {
    fn eq(&self, other: &[u8]) -> bool {
        self.matches(other)
    }
}

impl PartialEq<str> for FixedName {
    fn eq(&self, other: &str) -> bool {
        self.matches(other.as_bytes())
    }
}

impl Hash for FixedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Display for FixedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_bytes().escape_ascii())
    }
}

impl fmt::Debug for FixedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.as_bytes().escape_ascii())
    }
}
