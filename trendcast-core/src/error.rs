//! Pipeline error taxonomy.
//!
//! Every stage of the pipeline fails with one of four kinds. None of them are
//! retried by the pipeline; the caller sees the first failure and no partial
//! dataset is returned.

use crate::data::provider::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad keyword count, bad window sizing, malformed date string.
    /// Raised before any external call is made.
    #[error("validation error: {0}")]
    Validation(String),

    /// The external trend source returned nothing for the first window.
    #[error("no data: {0}")]
    NoData(String),

    /// A non-positive value reached a logarithmic transform.
    #[error("domain error: {0}")]
    Domain(String),

    /// Network or parse failure from a price or trend source, propagated unchanged.
    #[error("external source error: {0}")]
    ExternalSource(#[from] SourceError),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn no_data(msg: impl Into<String>) -> Self {
        Self::NoData(msg.into())
    }

    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_errors_convert_to_external() {
        let err: PipelineError = SourceError::NetworkUnreachable("timed out".into()).into();
        assert!(matches!(err, PipelineError::ExternalSource(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn display_names_the_kind() {
        assert_eq!(
            PipelineError::validation("bad").to_string(),
            "validation error: bad"
        );
        assert_eq!(PipelineError::domain("ln(0)").to_string(), "domain error: ln(0)");
    }
}
