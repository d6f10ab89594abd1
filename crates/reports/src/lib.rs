//! Report configuration core.
//!
//! Translates wire-level report configurations into the persisted form and
//! back, enforces the cross-field business rules, and post-processes query
//! results (split redistribution, row limits, percentage values).
//! Collaborator services are reached only through the traits in [`ports`];
//! infrastructure crates implement them.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ReportId`, `AttributionId`, etc.) |
//! | [`types`] | Wire enums and the metric selector |
//! | [`errors`] | `FieldError`, `ReportError`, accumulation helpers |
//! | [`field_id`] | `"<type>:<value>"` codec |
//! | [`config`] | Persisted report and configuration |
//! | [`external`] | Wire report and configuration |
//! | [`ports`] | Collaborator traits |
//! | [`metrics`] | Metric resolver |
//! | [`splits`] | Split translator and structural validator |
//! | [`merge`] | Config merger (`ReportTranslator`) |
//! | [`export`] | Persisted → wire export |
//! | [`validation`] | Rule pipeline |
//! | [`aggregation`] | Result layout, cells and percentage aggregators |
//! | [`redistribution`] | Splits applied to result rows |
//! | [`limits`] | Top/bottom row limits applied to result rows |

#[macro_use]
mod macros;

pub mod aggregation;
pub mod config;
pub mod errors;
pub mod export;
pub mod external;
pub mod field_id;
pub mod identifiers;
pub mod limits;
pub mod merge;
pub mod metrics;
pub mod ports;
pub mod redistribution;
pub mod splits;
pub mod types;
pub mod validation;

// Re-export the common surface at the crate root for downstream crates.
pub use aggregation::{apply_aggregator, Cell, ResultLayout};
pub use config::{Report, ReportConfig};
pub use errors::{finish, CollectValidation, FieldError, ReportError};
pub use external::{ExternalConfig, ExternalReport};
pub use field_id::{FieldId, FieldIdError, FieldType};
pub use identifiers::{AttributionGroupId, AttributionId, CustomMetricId, CustomerId, ReportId};
pub use limits::apply_limits;
pub use merge::ReportTranslator;
pub use metrics::MetricResolver;
pub use redistribution::apply_splits;
pub use splits::{SplitTranslator, StructuralSplitValidator};
pub use validation::{ReportRule, ReportValidator};
