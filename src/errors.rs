use std::{io, num::{ParseFloatError, ParseIntError}};

use quick_xml::events::attributes::AttrError;
use thiserror::Error;

use crate::data::{FeatureId, LayerId};

#[derive(Debug, Error)]
pub enum Error {
    /// The selection or topology a manipulation needs is absent.
    #[error("precondition unmet: {0}")]
    PreconditionUnmet(String),

    /// A command target was removed or altered before the command ran.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("unknown feature {0}")]
    UnknownFeature(FeatureId),

    #[error("unknown layer {0}")]
    UnknownLayer(LayerId),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Error::PreconditionUnmet(message.into())
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::PreconditionUnmet(_))
    }
}

impl From<AttrError> for Error {
    fn from(value: AttrError) -> Self {
        Error::Other(value.to_string())
    }
}

impl From<ParseFloatError> for Error {
    fn from(value: ParseFloatError) -> Self {
        Error::Other(value.to_string())
    }
}

impl From<ParseIntError> for Error {
    fn from(value: ParseIntError) -> Self {
        Error::Other(value.to_string())
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error::Other(value.to_string())
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
