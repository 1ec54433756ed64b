//! Element identifiers and their allocation.
//!
//! A document issues identifiers per element kind. Identifiers are either
//! sequential integers or UUID strings; once a UUID has been seen the
//! document keeps issuing UUIDs for every kind.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::element::ElementKind;
use crate::error::ValidationError;

/// Identifier of an element within its kind table.
///
/// `Integer` and `Uuid` values never compare equal, even when their text
/// happens to match. `None` means "no identifier requested".
///
/// # Examples
///
/// ```
/// use openlabel::{parse_uid, Uid};
///
/// assert_eq!(parse_uid("12").unwrap(), Uid::Integer(12));
/// assert_eq!(parse_uid("").unwrap(), Uid::None);
/// assert!(parse_uid("not-a-uid").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Uid {
    /// No identifier.
    #[default]
    None,
    /// Sequential integer identifier.
    Integer(u64),
    /// Canonical 8-4-4-4-12 hexadecimal UUID text.
    Uuid(String),
}

impl Uid {
    /// True for [`Uid::None`].
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// True for [`Uid::Uuid`].
    #[must_use]
    pub const fn is_uuid(&self) -> bool {
        matches!(self, Self::Uuid(_))
    }

    /// The number of an integer uid.
    #[must_use]
    pub const fn as_integer(&self) -> Option<u64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Uuid(s) => f.write_str(s),
        }
    }
}

impl From<u64> for Uid {
    fn from(n: u64) -> Self {
        Self::Integer(n)
    }
}

impl From<Uuid> for Uid {
    fn from(uuid: Uuid) -> Self {
        Self::Uuid(uuid.to_string())
    }
}

impl std::str::FromStr for Uid {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_uid(s)
    }
}

impl Serialize for Uid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_uid(&text).map_err(serde::de::Error::custom)
    }
}

fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        )
        .expect("static UUID pattern is valid")
    })
}

/// Parses identifier text supplied by a caller.
///
/// # Errors
///
/// Returns `ValidationError::MalformedIdentifier` when the text is neither
/// empty, all digits, nor a canonical UUID.
pub fn parse_uid(text: &str) -> Result<Uid, ValidationError> {
    if text.is_empty() {
        return Ok(Uid::None);
    }
    if text.bytes().all(|b| b.is_ascii_digit()) {
        return text
            .parse::<u64>()
            .map(Uid::Integer)
            .map_err(|_| ValidationError::MalformedIdentifier {
                value: text.to_string(),
            });
    }
    if uuid_pattern().is_match(text) {
        return Ok(Uid::Uuid(text.to_string()));
    }
    Err(ValidationError::MalformedIdentifier {
        value: text.to_string(),
    })
}

/// Source of fresh UUIDs for documents in UUID mode.
pub trait UuidSource: fmt::Debug + Send {
    /// Returns a new UUID in canonical text form.
    fn next_uuid(&mut self) -> String;
}

/// Random version-4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomUuids;

impl UuidSource for RandomUuids {
    fn next_uuid(&mut self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Per-kind identifier issuance.
#[derive(Debug, Clone, Default)]
pub struct UidAllocator {
    last_used: [Option<u64>; ElementKind::COUNT],
    uuid_mode: bool,
}

impl UidAllocator {
    /// Creates an allocator, optionally latched in UUID mode.
    #[must_use]
    pub fn new(uuid_mode: bool) -> Self {
        Self {
            last_used: [None; ElementKind::COUNT],
            uuid_mode,
        }
    }

    /// Returns the largest integer issued or accepted for `kind`.
    #[must_use]
    pub const fn last_used(&self, kind: ElementKind) -> Option<u64> {
        self.last_used[kind.index()]
    }

    /// Returns true once a UUID has been used anywhere in the document.
    #[must_use]
    pub const fn uuid_mode(&self) -> bool {
        self.uuid_mode
    }

    pub(crate) fn set_uuid_mode(&mut self, on: bool) {
        self.uuid_mode = on;
    }

    /// Resolves the identifier to use for a declaration of `kind`.
    ///
    /// An explicit integer below or equal to the counter is an intentional
    /// reuse and leaves the counter untouched.
    pub fn resolve(&mut self, kind: ElementKind, requested: Uid, uuids: &mut dyn UuidSource) -> Uid {
        match requested {
            Uid::None => {
                if self.uuid_mode {
                    return Uid::Uuid(uuids.next_uuid());
                }
                let slot = &mut self.last_used[kind.index()];
                let next = slot.map_or(0, |n| n + 1);
                *slot = Some(next);
                Uid::Integer(next)
            }
            Uid::Integer(n) => {
                let slot = &mut self.last_used[kind.index()];
                if slot.map_or(true, |last| n > last) {
                    *slot = Some(n);
                }
                Uid::Integer(n)
            }
            Uid::Uuid(s) => {
                self.uuid_mode = true;
                Uid::Uuid(s)
            }
        }
    }

    /// Records an identifier found in a loaded document.
    pub(crate) fn observe(&mut self, kind: ElementKind, uid: &Uid) {
        match uid {
            Uid::Integer(n) => {
                let slot = &mut self.last_used[kind.index()];
                if slot.map_or(true, |last| *n > last) {
                    *slot = Some(*n);
                }
            }
            Uid::Uuid(_) => self.uuid_mode = true,
            Uid::None => {}
        }
    }
}
