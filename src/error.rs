//! Error types used by the plugboard runtime and feature hooks.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`] — errors raised by the orchestration runtime itself.
//! - [`FeatureError`] — errors raised by individual lifecycle hook executions.
//!
//! It also defines [`ErrorRecord`], the snapshot kept in the registry's
//! bounded error history and attached to `feature:error` events.

use std::any::Any;
use std::time::SystemTime;

use thiserror::Error;

use crate::features::Phase;

/// # Errors produced by the plugboard runtime.
///
/// These represent failures in the orchestration system itself,
/// such as an invalid dependency graph discovered during initialization.
/// Failures of individual features never surface here; they are contained
/// per unit and reported as [`ErrorRecord`]s.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The dependency graph is invalid (missing references and/or cycles).
    #[error("dependency graph is invalid: {}", errors.join("; "))]
    InvalidGraph {
        /// One entry per missing dependency reference or detected cycle.
        errors: Vec<String>,
    },

    /// The named feature is not present in the registry.
    #[error("feature {name:?} is not registered")]
    UnknownFeature {
        /// Name the caller asked for.
        name: String,
    },

    /// A lifecycle operation was invoked before `initialize()` succeeded.
    #[error("manager is not initialized")]
    NotInitialized,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use plugboard::RuntimeError;
    ///
    /// let err = RuntimeError::NotInitialized;
    /// assert_eq!(err.as_label(), "manager_not_initialized");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::InvalidGraph { .. } => "graph_invalid",
            RuntimeError::UnknownFeature { .. } => "feature_unknown",
            RuntimeError::NotInitialized => "manager_not_initialized",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::InvalidGraph { errors } => {
                format!("invalid graph ({} problems): {}", errors.len(), errors.join("; "))
            }
            RuntimeError::UnknownFeature { name } => format!("unknown feature: {name}"),
            RuntimeError::NotInitialized => "manager not initialized".to_string(),
        }
    }
}

/// # Errors produced by lifecycle hook execution.
///
/// These represent failures of individual feature hooks driven by the
/// runtime. A panicking hook is caught and normalized into
/// [`FeatureError::Panicked`]; an interrupted retry wait becomes
/// [`FeatureError::Interrupted`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FeatureError {
    /// A lifecycle hook returned an error.
    #[error("hook failed: {error}")]
    Hook {
        /// The underlying error message.
        error: String,
    },

    /// A lifecycle hook panicked; the payload was captured.
    #[error("hook panicked: {message}")]
    Panicked {
        /// Text extracted from the panic payload.
        message: String,
    },

    /// The wait before a retry was cancelled by `stop`/`destroy`.
    #[error("retry wait interrupted")]
    Interrupted,
}

impl FeatureError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use plugboard::FeatureError;
    ///
    /// let err = FeatureError::Hook { error: "boom".into() };
    /// assert_eq!(err.as_label(), "hook_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            FeatureError::Hook { .. } => "hook_failed",
            FeatureError::Panicked { .. } => "hook_panicked",
            FeatureError::Interrupted => "retry_interrupted",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            FeatureError::Hook { error } => format!("error: {error}"),
            FeatureError::Panicked { message } => format!("panic: {message}"),
            FeatureError::Interrupted => "retry wait interrupted".to_string(),
        }
    }

    /// Indicates whether this failure came from a cancelled retry wait
    /// rather than from the hook itself.
    ///
    /// # Example
    /// ```
    /// use plugboard::FeatureError;
    ///
    /// assert!(FeatureError::Interrupted.is_interrupted());
    /// assert!(!FeatureError::Hook { error: "boom".into() }.is_interrupted());
    /// ```
    pub fn is_interrupted(&self) -> bool {
        matches!(self, FeatureError::Interrupted)
    }

    /// Normalizes a caught panic payload into an error.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        FeatureError::Panicked {
            message: panic_text(payload),
        }
    }
}

/// # Snapshot of a single hook failure.
///
/// Appended to the registry's bounded error history and carried on
/// `feature:error` events. The `url` field captures the activation context
/// the unit was running against, when one was available.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    /// Name of the failing feature.
    pub feature: String,
    /// Lifecycle phase the failure occurred in.
    pub phase: Phase,
    /// Stringified hook error.
    pub error: String,
    /// Wall-clock time of the failure.
    pub at: SystemTime,
    /// URL from the activation context, if the phase had one.
    pub url: Option<String>,
}

impl ErrorRecord {
    pub(crate) fn new(feature: &str, phase: Phase, error: &FeatureError, url: Option<&str>) -> Self {
        Self {
            feature: feature.to_string(),
            phase,
            error: error.to_string(),
            at: SystemTime::now(),
            url: url.map(str::to_string),
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
