//! # XDS Types
//!
//! Validated primitives shared by the exchange crates.
//!
//! - [`NonEmptyText`] for identifiers that must carry content (repository ids, home community
//!   ids, document unique ids)
//! - [`Oid`] for ISO object identifiers, accepting the `urn:oid:` form used on the wire

/// Prefix used when an OID is carried as a URN.
pub const URN_OID_PREFIX: &str = "urn:oid:";

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input was not a dotted-decimal object identifier
    #[error("invalid OID: {0}")]
    InvalidOid(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Errors
    ///
    /// Returns `Err(TextError::Empty)` if the input is empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// An ISO object identifier in dotted-decimal form (for example `2.16.840.1.113883.4.357`).
///
/// Identifier systems frequently hand OIDs around as `urn:oid:2.16...`; the prefix is
/// stripped (case-insensitively) on construction so the stored value is always the bare
/// dotted-decimal form expected inside HL7 CX patient identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(String);

impl Oid {
    /// Parse an OID, accepting an optional `urn:oid:` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] for blank input and [`TextError::InvalidOid`] when the value
    /// is not a sequence of dot-separated decimal arcs.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }

        let bare = match trimmed.get(..URN_OID_PREFIX.len()) {
            Some(head) if head.eq_ignore_ascii_case(URN_OID_PREFIX) => {
                &trimmed[URN_OID_PREFIX.len()..]
            }
            _ => trimmed,
        };

        let valid = !bare.is_empty()
            && bare
                .split('.')
                .all(|arc| !arc.is_empty() && arc.bytes().all(|b| b.is_ascii_digit()));
        if !valid {
            return Err(TextError::InvalidOid(trimmed.to_owned()));
        }

        Ok(Self(bare.to_owned()))
    }

    /// The bare dotted-decimal value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The value in `urn:oid:` form.
    pub fn to_urn(&self) -> String {
        format!("{URN_OID_PREFIX}{}", self.0)
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Oid {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Oid::parse(s)
    }
}
