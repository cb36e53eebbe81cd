//! Error types for configuration and session construction.
//!
//! Navigation itself never fails: out-of-range targets clamp and unresolvable
//! targets fall back to an item origin. Only genuinely invalid input shapes
//! surface as errors, at the narrow boundaries that accept them.

use core::fmt;

/// Invalid reader settings.
#[derive(Clone, Debug, PartialEq)]
pub enum SettingsError {
    /// Viewport width or height is not a finite positive number.
    InvalidViewport { width: f64, height: f64 },
    /// Visibility threshold outside `[0, 1]`.
    InvalidThreshold(f64),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidViewport { width, height } => {
                write!(f, "invalid viewport size {}x{}", width, height)
            }
            Self::InvalidThreshold(value) => {
                write!(f, "visibility threshold {} is outside [0, 1]", value)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

/// Navigator session error.
#[derive(Clone, Debug, PartialEq)]
pub enum NavigatorError {
    /// Settings rejected by validation.
    Settings(SettingsError),
    /// Manifest contains two items with the same id.
    DuplicateItemId(String),
}

impl fmt::Display for NavigatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Settings(err) => write!(f, "invalid settings: {}", err),
            Self::DuplicateItemId(id) => write!(f, "duplicate spine item id: {}", id),
        }
    }
}

impl std::error::Error for NavigatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Settings(err) => Some(err),
            Self::DuplicateItemId(_) => None,
        }
    }
}

impl From<SettingsError> for NavigatorError {
    fn from(value: SettingsError) -> Self {
        Self::Settings(value)
    }
}
