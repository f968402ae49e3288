//! Error handling for lumagraph
//!
//! This module defines the crate-level error type and a Result alias.
//! Engine errors live in [`crate::graph::GraphError`] and convert into
//! [`LumaError`] with `?`.

use crate::graph::GraphError;
use thiserror::Error;

/// Main error type for lumagraph operations
#[derive(Error, Debug)]
pub enum LumaError {
    /// Errors raised by the graph engine
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Errors related to Rhai expression compilation or execution
    #[error("Script error: {0}")]
    Script(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<LumaError>,
    },
}

impl LumaError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        LumaError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        LumaError::Script(err.to_string())
    }
}

impl From<serde_json::Error> for LumaError {
    fn from(err: serde_json::Error) -> Self {
        LumaError::Serialization(err.to_string())
    }
}

/// Result type alias for lumagraph operations
pub type Result<T> = std::result::Result<T, LumaError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, GraphError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| LumaError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| LumaError::from(e).with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| LumaError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| LumaError::from_rhai_error(e).with_context(f()))
    }
}
