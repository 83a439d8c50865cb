use thiserror::Error;

/// Validation errors for symbols and run parameters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("unknown market '{value}', expected one of IBEX_35, COLCAP")]
    UnknownMarket { value: String },

    #[error("invalid history range '{value}', expected a count followed by d, mo or y, or 'max'")]
    InvalidRange { value: String },

    #[error("recommendation period '{value}' is not of the form 0m, -1m, ...")]
    InvalidPeriod { value: String },
}
