//! Attribute names.
//!
//! A frame key is either a signed ordinal or a string identifier. Frames keep
//! their attributes sorted by [`Name`], so the ordering here is observable:
//! every string sorts before every ordinal, ordinals compare numerically, and
//! strings compare by a collation key (case-folded text first, the exact text
//! as a tie-break).

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Attribute name: an ordinal or a string identifier.
///
/// Cloning is cheap; string names share their text.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Name {
    /// Positional name, as produced by list literals and ordinal keys.
    Ordinal(i64),
    /// Textual name.
    Str(Arc<str>),
}

impl Name {
    /// Create an ordinal name.
    #[inline]
    pub const fn ordinal(ordinal: i64) -> Self {
        Name::Ordinal(ordinal)
    }

    /// Create a string name.
    pub fn string(name: impl AsRef<str>) -> Self {
        Name::Str(Arc::from(name.as_ref()))
    }

    /// The ordinal, if this is an ordinal name.
    #[inline]
    pub fn as_ordinal(&self) -> Option<i64> {
        match self {
            Name::Ordinal(ordinal) => Some(*ordinal),
            Name::Str(_) => None,
        }
    }

    /// The text, if this is a string name.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Name::Ordinal(_) => None,
            Name::Str(name) => Some(name),
        }
    }

    /// True if this is a string name that is also a valid identifier
    /// (`[a-z][a-zA-Z0-9_]*`).
    pub fn is_identifier(&self) -> bool {
        self.as_str().is_some_and(is_identifier)
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Compare two strings by collation key.
///
/// Case-folded text decides first so `"apple" < "Banana" < "cherry"`; the
/// raw text breaks ties so the order stays consistent with equality.
fn collate(left: &str, right: &str) -> Ordering {
    let folded = left
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(right.chars().flat_map(char::to_lowercase));
    folded.then_with(|| left.cmp(right))
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Name::Ordinal(left), Name::Ordinal(right)) => left.cmp(right),
            (Name::Str(left), Name::Str(right)) => collate(left, right),
            (Name::Str(_), Name::Ordinal(_)) => Ordering::Less,
            (Name::Ordinal(_), Name::Str(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Name::string(name)
    }
}

impl From<String> for Name {
    fn from(name: String) -> Self {
        Name::Str(Arc::from(name))
    }
}

impl From<i64> for Name {
    fn from(ordinal: i64) -> Self {
        Name::Ordinal(ordinal)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Ordinal(ordinal) => write!(f, "Attribute({ordinal})"),
            Name::Str(name) if is_identifier(name) => f.write_str(name),
            Name::Str(name) => {
                f.write_str("Attribute(\"")?;
                for c in name.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        c if c.is_control() => write!(f, "\\x{:02x}", u32::from(c))?,
                        c => write!(f, "{c}")?,
                    }
                }
                f.write_str("\")")
            }
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

#[cfg(test)]
mod tests;
