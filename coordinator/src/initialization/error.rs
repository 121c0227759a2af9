use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;
use rand_distr::{NormalError, uniform::Error as UniformError};

/// The result type of building the initial global model.
pub type Result<T> = std::result::Result<T, InitErr>;

/// Error returned whenever the initial global model can't be built out of it's `ModelSpec`.
#[derive(Debug)]
pub enum InitErr {
    /// A distribution was configured with invalid parameters.
    Distribution(String),
    Shape(ShapeError),
}

impl From<NormalError> for InitErr {
    fn from(value: NormalError) -> Self {
        Self::Distribution(value.to_string())
    }
}

impl From<UniformError> for InitErr {
    fn from(value: UniformError) -> Self {
        Self::Distribution(value.to_string())
    }
}

impl From<ShapeError> for InitErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl Display for InitErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distribution(e) => write!(f, "invalid distribution: {e}"),
            Self::Shape(e) => write!(f, "invalid layer shape: {e}"),
        }
    }
}

impl Error for InitErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Distribution(_) => None,
            Self::Shape(e) => Some(e),
        }
    }
}
