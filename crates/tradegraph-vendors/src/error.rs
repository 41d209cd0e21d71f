use thiserror::Error;
use tradegraph_models::{DataCategory, VendorId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VendorError {
    /// Transient; the router retries these with backoff.
    #[error("Vendor {vendor} unavailable for {category}: {reason}")]
    Unavailable {
        vendor: VendorId,
        category: DataCategory,
        reason: String,
    },

    /// Permanent for this invocation (unsupported ticker, malformed payload, ...).
    #[error("Vendor request rejected ({}): {reason}", describe(.vendor, .category))]
    Rejected {
        vendor: Option<VendorId>,
        category: Option<DataCategory>,
        reason: String,
    },
}

fn describe(vendor: &Option<VendorId>, category: &Option<DataCategory>) -> String {
    match (vendor, category) {
        (Some(v), Some(c)) => format!("{v}/{c}"),
        (Some(v), None) => v.to_string(),
        (None, Some(c)) => c.to_string(),
        (None, None) => "router".to_string(),
    }
}

impl VendorError {
    pub fn unavailable(vendor: VendorId, category: DataCategory, reason: impl Into<String>) -> Self {
        VendorError::Unavailable {
            vendor,
            category,
            reason: reason.into(),
        }
    }

    pub fn rejected(vendor: VendorId, category: DataCategory, reason: impl Into<String>) -> Self {
        VendorError::Rejected {
            vendor: Some(vendor),
            category: Some(category),
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, VendorError::Unavailable { .. })
    }
}
