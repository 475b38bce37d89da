use thiserror::Error;

/// Coarse classification of a fatal condition.
///
/// Every failure in this crate aborts the run; the kind tells the caller (and
/// the exit status) whether the inputs, the configuration, or the algorithm gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A file could not be opened, read, or written.
    Io,
    /// The parameter file or command line is inconsistent.
    Config,
    /// Input records are malformed or cannot be matched up.
    Data,
    /// The disaggregation reached a dead end (no donor, zero-shape donor, ...).
    Algorithm,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Io => 1,
            ErrorKind::Config => 2,
            ErrorKind::Data => 3,
            ErrorKind::Algorithm => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Io => "io error",
            ErrorKind::Config => "configuration error",
            ErrorKind::Data => "data error",
            ErrorKind::Algorithm => "algorithm error",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{}: {message}", kind.label())]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, message)
    }

    pub fn algorithm(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Algorithm, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}
