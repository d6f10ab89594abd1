//! Newtype domain identifiers.
//!
//! Every entity the report core refers to by identity is a distinct newtype
//! wrapping a string. This prevents accidentally passing, for example, an
//! [`AttributionId`] where an [`AttributionGroupId`] is expected even though
//! both are document IDs under the hood.
//!
//! These are *raw* identifiers. The composite `"<type>:<value>"` strings that
//! appear in dimension, filter, and split lists are handled by
//! [`crate::field_id`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a persisted report.
    ReportId
}

impl ReportId {
    /// Generates a fresh identifier for a report that has not been stored yet.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

string_id! {
    /// Identifies the customer (tenant) a request is scoped to.
    ///
    /// Every collaborator lookup that is tenant-specific takes this value.
    CustomerId
}

string_id! {
    /// Identifies a customer-defined calculated ("custom") metric.
    ///
    /// Custom metric IDs are document IDs; they never contain `/` or spaces.
    /// The check lives in the metric resolver so that a malformed ID is
    /// reported as a field error rather than rejected at deserialisation.
    CustomMetricId
}

string_id! {
    /// Identifies an attribution (a named, filter-defined slice of spend).
    AttributionId
}

string_id! {
    /// Identifies an attribution group (an ordered set of attributions).
    ///
    /// Splits are keyed by the attribution group whose values they
    /// redistribute.
    AttributionGroupId
}
