use thiserror::Error;

use crate::convolution::ConvolutionError;
use crate::data::DataError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompartmentError {
    #[error("Invalid input data: {0}")]
    Data(#[from] DataError),
    #[error("Convolution failed: {0}")]
    Convolution(#[from] ConvolutionError),
    #[error("Unknown parameter '{name}' for the {model} model")]
    UnknownParameter { model: &'static str, name: String },
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: f64 },
    #[error("Missing parameter: {0}")]
    MissingParameter(String),
    #[error("Expected {expected} fit parameters, got {found}")]
    ParameterCount { expected: usize, found: usize },
    /// Raw parameters with no valid physiological counterpart
    #[error("Parameters outside the model domain: {0}")]
    Domain(String),
    /// A fit-dependent operation was requested before a successful fit
    #[error("{operation} requires a successful fit")]
    NotFitted { operation: &'static str },
    #[error("Bootstrap needs at least one sample")]
    NoSamples,
    #[error("Invalid confidence level: {0}")]
    InvalidConfidence(f64),
    #[error("Serialization error: {0}")]
    Serialization(String),
}
