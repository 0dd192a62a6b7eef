//! Per-exchange options.

use bon::Builder;
use serde::{Deserialize, Serialize};

/// Options for a single exchange.
///
/// Anything left unset falls back to the engine configuration.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct SendOptions {
    /// Sampling temperature for every model call of the exchange.
    pub temperature: Option<f64>,
    /// Number of reference chunks to retrieve.
    pub top_k: Option<usize>,
    /// Restrict retrieval to one category.
    #[builder(into)]
    pub category_filter: Option<String>,
    /// One-shot context appended to the system prompt for this exchange only.
    #[builder(into)]
    pub context_summary: Option<String>,
}
