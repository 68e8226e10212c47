use thiserror::Error;

/// Failures that abort one analysis cycle for one instrument.
///
/// Degenerate numeric conditions (zero IV, empty windows, no qualifying
/// levels) are not represented here; they resolve to fallback values.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Snapshot is missing field: {0}")]
    MissingField(&'static str),

    #[error("Option chain has no paired CE/PE rows for expiry {0}")]
    EmptyChain(String),

    #[error("Snapshot has no expiry dates")]
    NoExpiry,

    #[error("Invalid expiry date '{value}': {source}")]
    InvalidExpiry {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Previous close is required on expiry day but was not supplied")]
    MissingPreviousClose,

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Config error: {0}")]
    Config(String),
}
