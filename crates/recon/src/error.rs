use thiserror::Error;

use crate::model::Source;

#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (bad threshold, conflicting amount columns, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// Required column absent from the header. Raised before any row is parsed.
    #[error("{origin} file: missing required column '{column}'")]
    ColumnMissing { origin: Source, column: String },
    /// Header found but no data rows follow it.
    #[error("{origin} file: no data rows")]
    EmptyDataset { origin: Source },
    #[error("{origin} row {row_index}: cannot parse date '{value}' in column '{column}'")]
    DateParse {
        origin: Source,
        row_index: usize,
        column: String,
        value: String,
    },
    #[error("{origin} row {row_index}: cannot parse amount '{value}' in column '{column}'")]
    AmountParse {
        origin: Source,
        row_index: usize,
        column: String,
        value: String,
    },
    #[error("{origin} file: {rows} data rows exceeds the limit of {limit}")]
    InputTooLarge { origin: Source, rows: usize, limit: usize },
    /// Engine invariant violated. Always a defect, never a user error.
    #[error("internal consistency error: {0}")]
    InternalConsistency(String),
    /// Bytes could not be decoded as the declared format.
    #[error("{origin} file: cannot read input: {message}")]
    Read { origin: Source, message: String },
}

impl ReconError {
    /// Stable identifier for callers that map errors onto their own responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "config_parse",
            Self::ConfigValidation(_) => "config_validation",
            Self::ColumnMissing { .. } => "column_missing",
            Self::EmptyDataset { .. } => "empty_dataset",
            Self::DateParse { .. } => "date_parse",
            Self::AmountParse { .. } => "amount_parse",
            Self::InputTooLarge { .. } => "input_too_large",
            Self::InternalConsistency(_) => "internal_consistency",
            Self::Read { .. } => "read",
        }
    }

    pub fn is_defect(&self) -> bool {
        matches!(self, Self::InternalConsistency(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::ConfigParse(_) | Self::ConfigValidation(_))
    }

    /// Source the error refers to, if it is tied to one input.
    pub fn origin(&self) -> Option<Source> {
        match self {
            Self::ColumnMissing { origin, .. }
            | Self::EmptyDataset { origin }
            | Self::DateParse { origin, .. }
            | Self::AmountParse { origin, .. }
            | Self::InputTooLarge { origin, .. }
            | Self::Read { origin, .. } => Some(*origin),
            _ => None,
        }
    }
}
