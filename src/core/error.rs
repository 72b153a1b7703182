use thiserror::Error;

/// Error raised by a database driver behind [`crate::db::SqlExecutor`].
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ModelError {
    // ---------------------------------------------------------------
    // Configuration errors: detected while declaring models, methods
    // and views. They abort startup.
    // ---------------------------------------------------------------
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("Unknown field '{field}' in model '{model}'")]
    UnknownField { model: String, field: String },

    #[error("Unknown method '{method}' on model '{model}'")]
    UnknownMethod { model: String, method: String },

    #[error("Method '{model}.{method}': {reason}")]
    InvalidSignature {
        model: String,
        method: String,
        reason: String,
    },

    #[error("Method '{model}.{method}': signature does not match, expected {expected}, received {received}")]
    SignatureMismatch {
        model: String,
        method: String,
        expected: String,
        received: String,
    },

    #[error("Cannot declare '{0}' after bootstrap")]
    AlreadyBootstrapped(String),

    #[error("No data given for {0}")]
    EmptyPayload(&'static str),

    #[error("No database adapter registered for driver '{0}'")]
    UnknownAdapter(String),

    #[error("Model '{0}' is already declared")]
    DuplicateModel(String),

    #[error("Invalid model definition: {0}")]
    InvalidModel(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("View error: {0}")]
    ViewError(String),

    // ---------------------------------------------------------------
    // Data errors: bad input reaching a single call.
    // ---------------------------------------------------------------
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Method '{model}.{method}' has no layer below the current one")]
    NoNextLayer { model: String, method: String },

    // ---------------------------------------------------------------
    // Execution errors from the database collaborator.
    // ---------------------------------------------------------------
    #[error("Error while executing query '{query}' with args [{args}]: {source}")]
    Execution {
        query: String,
        args: String,
        #[source]
        source: DriverError,
    },

    #[error("Query '{query}' returned {rows} rows, expected exactly one")]
    UnexpectedRowCount { query: String, rows: usize },

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl ModelError {
    /// Setup/programmer errors that should abort process startup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownModel(_)
                | Self::UnknownField { .. }
                | Self::UnknownMethod { .. }
                | Self::InvalidSignature { .. }
                | Self::SignatureMismatch { .. }
                | Self::AlreadyBootstrapped(_)
                | Self::EmptyPayload(_)
                | Self::UnknownAdapter(_)
                | Self::DuplicateModel(_)
                | Self::InvalidModel(_)
                | Self::ParseError(_)
                | Self::InvalidConfig(_)
                | Self::ViewError(_)
        )
    }

    pub fn is_data(&self) -> bool {
        matches!(
            self,
            Self::TypeMismatch(_) | Self::InvalidExpression(_) | Self::NoNextLayer { .. }
        )
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::UnexpectedRowCount { .. })
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// Log a configuration error where it is detected and hand it back for `?`.
pub(crate) fn log_and_fail(err: ModelError) -> ModelError {
    log::error!("{}", err);
    err
}

impl<T> From<std::sync::PoisonError<T>> for ModelError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
