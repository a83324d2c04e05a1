use std::sync::Arc;

use thiserror::Error;

use crate::types::NodeId;

/// Convenience alias for `Result<T, FalconError>`.
pub type FalconResult<T> = Result<T, FalconError>;

/// Error classification for retry/escalation decisions.
///
/// - `UserError`: bad input, wrong SQL, bad configuration (4xx equivalent)
/// - `Retryable`: topology change (e.g. a source node left); the query MAY be re-dispatched
/// - `Cancelled`: the query was cancelled; not an operational failure
/// - `InternalBug`: should never happen; triggers alert + diagnostic dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserError,
    Retryable,
    Cancelled,
    InternalBug,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum FalconError {
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The query was cancelled by the client, a statement timeout, or a
    /// topology change observed by the executor.
    #[error("Query canceled: {0}")]
    QueryCanceled(String),

    /// Internal bug: should never occur in production.
    /// Always carries a unique `error_code` and `debug_context` for post-mortem.
    #[error("InternalBug [{error_code}]: {message} | context: {debug_context}")]
    InternalBug {
        error_code: &'static str,
        message: String,
        debug_context: String,
    },
}

/// Execution engine errors, as reported by the node that ran a sub-scan.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Division by zero")]
    DivisionByZero,
}

/// Cluster / distributed execution errors.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The node left the cluster (or became unreachable) while serving a sub-scan.
    #[error("{0} left the cluster")]
    NodeLeft(NodeId),

    /// A remote source reported a failure for its part of the scan.
    #[error("source {node} failed: {cause}")]
    SourceFailed {
        node: NodeId,
        #[source]
        cause: Arc<FalconError>,
    },
}

// ── FalconError classification & helpers ──

impl FalconError {
    /// Classify this error for retry/escalation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FalconError::Config(_) => ErrorKind::UserError,
            FalconError::Execution(ExecutionError::DivisionByZero) => ErrorKind::UserError,

            FalconError::Cluster(ClusterError::NodeLeft(_)) => ErrorKind::Retryable,
            // A source failure is as severe as whatever the remote node hit.
            FalconError::Cluster(ClusterError::SourceFailed { cause, .. }) => cause.kind(),

            FalconError::QueryCanceled(_) => ErrorKind::Cancelled,

            FalconError::InternalBug { .. } | FalconError::Internal(_) => ErrorKind::InternalBug,
        }
    }

    /// Returns true if the whole query may be re-dispatched.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Retryable)
    }

    /// Returns true if this is a user/input error (4xx equivalent).
    pub fn is_user_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::UserError)
    }

    /// Returns true if the query was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind(), ErrorKind::Cancelled)
    }

    /// Returns true if this is an internal bug that should never occur.
    pub fn is_internal_bug(&self) -> bool {
        matches!(self.kind(), ErrorKind::InternalBug)
    }

    /// Map to a PostgreSQL SQLSTATE code.
    pub fn pg_sqlstate(&self) -> &'static str {
        match self {
            FalconError::Config(_) => "F0000", // config_file_error
            FalconError::Execution(ExecutionError::DivisionByZero) => "22012", // division_by_zero
            FalconError::Cluster(ClusterError::NodeLeft(_)) => "08006", // connection_failure
            FalconError::Cluster(ClusterError::SourceFailed { cause, .. }) => cause.pg_sqlstate(),
            FalconError::QueryCanceled(_) => "57014", // query_canceled
            FalconError::InternalBug { .. } | FalconError::Internal(_) => "XX000", // internal_error
        }
    }

    /// Construct an internal bug error with error code and context.
    pub fn internal_bug(
        error_code: &'static str,
        message: impl Into<String>,
        debug_context: impl Into<String>,
    ) -> Self {
        FalconError::InternalBug {
            error_code,
            message: message.into(),
            debug_context: debug_context.into(),
        }
    }

    /// Emit a structured log entry for Fatal/InternalBug errors.
    /// Must be called for every Fatal error before it leaves the component
    /// that detected it. Log format is stable across patch versions.
    pub fn log_if_fatal(&self) {
        if let FalconError::InternalBug {
            error_code,
            message,
            debug_context,
        } = self
        {
            tracing::error!(
                error_code = error_code,
                error_category = "Fatal",
                component = Self::affected_component(self),
                sqlstate = self.pg_sqlstate(),
                debug_context = debug_context.as_str(),
                "FATAL [{}]: {} | context: {}",
                error_code,
                message,
                debug_context
            );
        }
    }

    /// Identify the affected component for structured logging.
    fn affected_component(&self) -> &'static str {
        match self {
            FalconError::Execution(_) => "executor",
            FalconError::Cluster(_) => "cluster",
            FalconError::Config(_) => "config",
            FalconError::QueryCanceled(_) => "executor",
            FalconError::InternalBug { .. } => "internal",
            FalconError::Internal(_) => "internal",
        }
    }
}
