//! Error types for the marshalling core

use thiserror::Error;

use crate::hresult::HResult;

/// Errors raised while moving data across the native boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InteropError {
    /// The native allocator could not satisfy a request. Never retried.
    #[error("Native allocation of {bytes} bytes failed")]
    OutOfMemory {
        /// Size of the failed request
        bytes: usize,
    },

    /// A caller supplied argument cannot be used for the requested operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Strict shape validation rejected a generic parameter access
    #[error("Parameter holds {expected} bytes but {type_name} spans {actual} bytes")]
    ShapeMismatch {
        /// Rust type the caller asked for
        type_name: &'static str,
        /// Size the native side declares
        expected: u32,
        /// Size of the requested type
        actual: u32,
    },

    /// A pointer/count pair read from native memory breaks the null <=> zero rule
    #[error("Field '{field}' pairs a {pointer} pointer with count {count}")]
    PointerCountMismatch {
        /// Native name of the pointer field
        field: &'static str,
        /// "null" or "non-null"
        pointer: &'static str,
        /// The paired count
        count: u32,
    },

    /// String contains a NUL byte and cannot be NUL terminated
    #[error("String contains an interior NUL byte")]
    InteriorNul,

    /// Character outside the single-byte ANSI range
    #[error("Character {0:?} has no single-byte ANSI encoding")]
    NotAnsi(char),

    /// The native call reported failure
    #[error(
        "Native call failed with {code}{}",
        message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
    )]
    Native {
        /// Status the call returned
        code: HResult,
        /// Compiler or loader diagnostics, when a buffer carried any
        message: Option<String>,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl InteropError {
    /// Result code carried by a native failure, if this is one
    pub fn native_code(&self) -> Option<HResult> {
        match self {
            InteropError::Native { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for marshalling operations
pub type Result<T> = std::result::Result<T, InteropError>;
