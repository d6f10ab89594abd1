//! Composite field identifiers.
//!
//! Dimensions, filters, groups, and splits all reference a field by a string
//! of the form `"<type>:<value>"`. For the label family the value is the
//! standard base64 encoding of the raw label key, so the identifier never
//! contains a third colon.
//!
//! ## Organization tags
//!
//! Organization tags are stored as ordinary labels whose raw key starts with
//! [`ORGANIZATION_TAG_PREFIX`]. Decoding a `label`/`project_label` identifier
//! whose key carries the prefix reports [`FieldType::OrganizationTag`];
//! encoding an organization tag writes a plain `label` identifier with the key
//! unchanged. The internal type therefore never says "organization tag".
//!
//! Keys of the other types are written verbatim, so they must not contain a
//! colon themselves.

use base64::prelude::*;
use thiserror::Error;

/// Raw-key prefix that marks a label as an organization tag.
pub const ORGANIZATION_TAG_PREFIX: &str = "org_tag:";

wire_enum! {
    /// Kind of field a composite identifier refers to.
    FieldType {
        Fixed => "fixed",
        Optional => "optional",
        Datetime => "datetime",
        Label => "label",
        Tag => "tag",
        ProjectLabel => "project_label",
        SystemLabel => "system_label",
        Attribution => "attribution",
        AttributionGroup => "attribution_group",
        Gke => "gke",
        GkeLabel => "gke_label",
        /// Wire-only: persisted as [`FieldType::Label`].
        OrganizationTag => "organization_tag",
    }
}

impl FieldType {
    /// Returns `true` when the identifier value is a base64 token.
    pub fn is_label_family(self) -> bool {
        matches!(
            self,
            Self::Label
                | Self::Tag
                | Self::ProjectLabel
                | Self::SystemLabel
                | Self::GkeLabel
                | Self::OrganizationTag
        )
    }

    /// The type written into persisted identifiers.
    pub fn persisted(self) -> Self {
        match self {
            Self::OrganizationTag => Self::Label,
            other => other,
        }
    }
}

/// Errors produced while encoding or decoding a composite identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldIdError {
    /// The identifier is not exactly two colon-separated segments.
    #[error("invalid id")]
    InvalidId,

    /// The type segment names no known field type.
    #[error("invalid metadata field type: {0}")]
    InvalidFieldType(String),

    /// A label-family value is not valid base64 or not UTF-8.
    #[error("failed to decode key: {0}")]
    InvalidEncoding(String),

    /// A verbatim key contains the segment separator.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// A decoded composite identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldId {
    /// Field type as seen by API clients.
    pub field_type: FieldType,
    /// Raw (decoded) key.
    pub key: String,
}

impl FieldId {
    /// Creates a field identifier from a type and a raw key.
    pub fn new(field_type: FieldType, key: impl Into<String>) -> Self {
        Self {
            field_type,
            key: key.into(),
        }
    }

    /// Returns the persisted `"<type>:<value>"` form.
    pub fn encode(&self) -> Result<String, FieldIdError> {
        encode(self.field_type, &self.key)
    }

    /// Parses a persisted identifier.
    pub fn decode(id: &str) -> Result<Self, FieldIdError> {
        let (field_type, key) = decode(id)?;
        Ok(Self { field_type, key })
    }
}

/// Encodes a field reference as `"<type>:<value>"`.
///
/// Fails when a key written verbatim contains `':'`, since [`decode`] would
/// reject the result.
pub fn encode(field_type: FieldType, key: &str) -> Result<String, FieldIdError> {
    let persisted = field_type.persisted();
    if persisted.is_label_family() {
        return Ok(format!("{}:{}", persisted, BASE64_STANDARD.encode(key.as_bytes())));
    }
    if key.contains(':') {
        return Err(FieldIdError::InvalidKey(key.to_string()));
    }
    Ok(format!("{persisted}:{key}"))
}

/// Decodes `"<type>:<value>"` into a field type and raw key.
pub fn decode(id: &str) -> Result<(FieldType, String), FieldIdError> {
    let (type_segment, value) = id.split_once(':').ok_or(FieldIdError::InvalidId)?;
    if value.contains(':') {
        return Err(FieldIdError::InvalidId);
    }

    let field_type: FieldType = type_segment
        .parse()
        .map_err(|_| FieldIdError::InvalidFieldType(type_segment.to_string()))?;
    if field_type == FieldType::OrganizationTag {
        return Err(FieldIdError::InvalidFieldType(type_segment.to_string()));
    }

    if !field_type.is_label_family() {
        return Ok((field_type, value.to_string()));
    }

    let bytes = BASE64_STANDARD
        .decode(value)
        .map_err(|e| FieldIdError::InvalidEncoding(e.to_string()))?;
    let key = String::from_utf8(bytes).map_err(|e| FieldIdError::InvalidEncoding(e.to_string()))?;

    let reported = match field_type {
        FieldType::Label | FieldType::ProjectLabel if key.starts_with(ORGANIZATION_TAG_PREFIX) => {
            FieldType::OrganizationTag
        }
        other => other,
    };

    Ok((reported, key))
}

/// Returns the raw attribution ID from an `attribution:<id>` identifier.
pub fn attribution_key(id: &str) -> Option<&str> {
    id.strip_prefix("attribution:")
}

/// Returns the raw group ID from an `attribution_group:<id>` identifier.
pub fn attribution_group_key(id: &str) -> Option<&str> {
    id.strip_prefix("attribution_group:")
}
