//! Contains the [`Record`] type, the unit of optimistic concurrency,
//! and the [`Layout`] describing how it is persisted in a [Store][crate::store::Store].

use std::borrow::Cow;
use std::fmt::{Debug, Display};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::store::Fields;
use crate::version::Version;

/// Marker trait for the application values a [`Record`] can carry.
///
/// A payload is stored in its string form, so it must be able to
/// parse itself back from what its [`Display`] implementation produced.
pub trait Payload: FromStr + Display + Debug + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: FromStr + Display + Debug + Clone + Send + Sync + 'static {}

/// A versioned record, as read from or committed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Record<P = i64> {
    /// Unique identifier of the record in the store.
    pub id: String,

    /// The application value mutated by updates.
    pub payload: P,

    /// The [Version] the record was at when it has been read.
    pub version: Version,
}

/// Reason why a stored field could not be turned into a [`Record`] field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    /// The field is not present in the stored entry.
    Missing,
    /// The field is present, but the stored value does not parse.
    Malformed(String),
}

/// Error returned when a stored entry exists but its fields cannot be read
/// back as a [`Record`].
///
/// A corrupt record is never defaulted to zero values: callers must not
/// proceed on a partially-read record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("record '{id}' is corrupt, field '{field}' {}", describe(.reason))]
pub struct CorruptRecordError {
    /// Identifier of the corrupt record.
    pub id: String,

    /// Name of the offending field.
    pub field: String,

    /// What is wrong with the field.
    pub reason: Corruption,
}

fn describe(reason: &Corruption) -> String {
    match reason {
        Corruption::Missing => "is missing".to_owned(),
        Corruption::Malformed(value) => format!("holds a malformed value: '{}'", value),
    }
}

/// Error returned when a [`Layout`] would store the payload and the version
/// under the same field, making one overwrite the other.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("payload and version cannot share the field name '{field}'")]
pub struct LayoutError {
    /// The field name used twice.
    pub field: String,
}

/// Names of the fields a [`Record`] is stored under.
///
/// The two names are always distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    payload_field: Cow<'static, str>,
    version_field: Cow<'static, str>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            payload_field: Cow::Borrowed("payload"),
            version_field: Cow::Borrowed(Self::VERSION_FIELD),
        }
    }
}

impl Layout {
    /// Default name of the version field.
    pub const VERSION_FIELD: &'static str = "version";

    /// Creates a new `Layout` storing the payload under the specified field
    /// name, and the version under [`Layout::VERSION_FIELD`].
    ///
    /// # Errors
    ///
    /// Returns a [`LayoutError`] if `payload_field` is [`Layout::VERSION_FIELD`].
    pub fn new(payload_field: impl Into<Cow<'static, str>>) -> Result<Self, LayoutError> {
        Self {
            payload_field: payload_field.into(),
            version_field: Cow::Borrowed(Self::VERSION_FIELD),
        }
        .validated()
    }

    /// Changes the name of the field the version is stored under.
    ///
    /// # Errors
    ///
    /// Returns a [`LayoutError`] if `name` is the payload field name.
    pub fn version_field(mut self, name: impl Into<Cow<'static, str>>) -> Result<Self, LayoutError> {
        self.version_field = name.into();
        self.validated()
    }

    fn validated(self) -> Result<Self, LayoutError> {
        if self.payload_field == self.version_field {
            return Err(LayoutError {
                field: self.version_field.into_owned(),
            });
        }

        Ok(self)
    }

    /// Returns the names of the two fields, payload first.
    pub fn field_names(&self) -> [&str; 2] {
        [&*self.payload_field, &*self.version_field]
    }

    pub(crate) fn encode<P>(&self, payload: &P, version: Version) -> Fields
    where
        P: Payload,
    {
        let mut fields = Fields::with_capacity(2);
        fields.insert(self.payload_field.to_string(), payload.to_string());
        fields.insert(self.version_field.to_string(), version.to_string());
        fields
    }

    pub(crate) fn decode<P>(&self, id: &str, fields: &Fields) -> Result<Record<P>, CorruptRecordError>
    where
        P: Payload,
    {
        let payload = parse_field(id, fields, &self.payload_field)?;
        let version = parse_field(id, fields, &self.version_field)?;

        Ok(Record {
            id: id.to_owned(),
            payload,
            version,
        })
    }
}

fn parse_field<T>(id: &str, fields: &Fields, name: &str) -> Result<T, CorruptRecordError>
where
    T: FromStr,
{
    let corrupt = |reason| CorruptRecordError {
        id: id.to_owned(),
        field: name.to_owned(),
        reason,
    };

    let raw = fields.get(name).ok_or_else(|| corrupt(Corruption::Missing))?;

    raw.trim()
        .parse()
        .map_err(|_| corrupt(Corruption::Malformed(raw.clone())))
}
