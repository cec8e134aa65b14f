//! Interop configuration, loadable from YAML

use serde::Deserialize;

use crate::error::{InteropError, Result};

/// Whether the generic parameter accessor checks the requested byte size
/// against the size the native side reports for the parameter.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShapeValidation {
    /// The caller's type is trusted as is
    #[default]
    Off,
    /// Mismatching sizes fail with `ShapeMismatch`
    Strict,
}

/// Settings shared by the handle factory and the parameter accessor
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct InteropConfig {
    /// Route named handles through the shared intern cache
    pub intern_names: bool,

    /// Size checks for the generic accessor path
    pub shape_validation: ShapeValidation,
}

impl Default for InteropConfig {
    fn default() -> Self {
        InteropConfig {
            intern_names: true,
            shape_validation: ShapeValidation::Off,
        }
    }
}

impl InteropConfig {
    /// Parses a YAML document. Missing keys take their defaults and unknown
    /// keys are an error.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| InteropError::Config(e.to_string()))
    }

    /// Sets `intern_names`
    pub fn with_intern_names(mut self, intern_names: bool) -> Self {
        self.intern_names = intern_names;
        self
    }

    /// Sets `shape_validation`
    pub fn with_shape_validation(mut self, shape_validation: ShapeValidation) -> Self {
        self.shape_validation = shape_validation;
        self
    }
}
