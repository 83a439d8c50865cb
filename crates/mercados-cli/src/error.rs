use mercados_core::{PipelineError, ValidationError};
use mercados_warehouse::WarehouseError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for CliError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Validation(error) => Self::Validation(error),
            PipelineError::Warehouse(error) => Self::Warehouse(error),
        }
    }
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Warehouse(WarehouseError::InvalidConfig(_)) => 2,
            Self::Warehouse(WarehouseError::Connection { .. }) => 3,
            Self::Serialization(_) => 4,
            Self::Warehouse(_) | Self::Io(_) => 10,
        }
    }
}
