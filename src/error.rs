// =============================================================================
// Domain errors
// =============================================================================
//
// Plumbing (HTTP, config files) reports through `anyhow`; the ticker core and
// the registry use these typed errors so callers can match on them.

use thiserror::Error;

/// Malformed, absent or premature market data. Always recoverable: the
/// offending sample is dropped and the ticker keeps its previous state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("upstream payload was empty")]
    EmptyPayload,

    #[error("missing field in upstream payload: {0}")]
    MissingField(String),

    #[error("invalid price: {0}")]
    InvalidPrice(f64),

    #[error("ticker has not received any samples yet")]
    NotInitialized,

    #[error("failed to parse upstream payload: {0}")]
    Parse(String),
}

impl DataError {
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        DataError::MissingField(field.into())
    }
}

/// Errors raised when registering instruments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("ticker already registered: {0}")]
    DuplicateSymbol(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        assert_eq!(
            DataError::missing("meta.currency").to_string(),
            "missing field in upstream payload: meta.currency"
        );
        assert_eq!(
            RegistryError::DuplicateSymbol("AAPL".into()).to_string(),
            "ticker already registered: AAPL"
        );
    }
}
