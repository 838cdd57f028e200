use thiserror::Error;

use super::config::ConfigError;
use crate::core::linkcell::LinkCellError;
use crate::core::model::{Action, ModelError};
use crate::core::trap::TrapError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Spatial index error: {source}")]
    Index {
        #[from]
        source: LinkCellError,
    },

    #[error("Physical model error: {source}")]
    Model {
        #[from]
        source: ModelError,
    },

    #[error("Trap field error: {0}")]
    Trap(#[from] TrapError),

    #[error("Object index {index} is out of range for an ensemble of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Defect {index} ({kind}) lies outside the box along non-periodic axis {axis}")]
    OutsideDomain {
        index: usize,
        kind: String,
        axis: usize,
    },

    #[error("Rate of action '{action}' on defect {index} is not finite")]
    NonFiniteRate { index: usize, action: Action },

    #[error("No cascades to anneal")]
    NoCascades,

    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
