//! Runtime error and supporting code.
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible script runtime errors.
#[derive(Error, Debug)]
pub enum Error {
    /// No script, params entry or resource under the given key.
    #[error("not found: {0}")]
    NotFound(String),
    /// Address failed validation.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// The name service could not turn a name into an address.
    #[error("failed to resolve name or address {name}: {reason}")]
    NameResolution { name: String, reason: String },
    /// Signer set of a dispatched message is not exactly the executor.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Gas meter exhausted.
    #[error("out of gas: limit {limit}, consumed {consumed}, requested {requested}")]
    OutOfGas {
        limit: u64,
        consumed: u64,
        requested: u64,
    },
    /// Interpreter failed and printed structured error data.
    #[error("script execution error: {0}")]
    ScriptExecution(String),
    /// Interpreter failed without structured output.
    #[error("interpreter exited with {status}: {output}")]
    InterpreterFailed { status: String, output: String },
    /// Interpreter could not be launched or waited on.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// Malformed request coming from a script or a caller.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Historical state outside the retention policy or not retained locally.
    #[error("historical state at height {height} unavailable: {reason}")]
    HistoricalState { height: i64, reason: String },
    /// Value failed validation.
    #[error("invalid value: {0}")]
    Invalid(String),
    /// No handler registered for a message type or query path.
    #[error("no handler found for {0}")]
    NoHandler(String),
    /// Configuration file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
    /// Filesystem or process I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// A handler panicked while serving a bridge call.
    #[error("panic: {0}")]
    Panic(String),
    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
    /// An error with additional context.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps `self` with a context message.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through context wrappers.
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Context { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn is_out_of_gas(&self) -> bool {
        matches!(self.root(), Error::OutOfGas { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.root(), Error::Unauthorized(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound(_))
    }

    /// Converts a caught panic payload into an error.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Error::Panic(message)
    }
}

/// Adds context to errors in a `Result`.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().wrap(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().wrap(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_looks_through_context() {
        let err = Error::OutOfGas {
            limit: 10,
            consumed: 10,
            requested: 5,
        }
        .wrap("consume gas")
        .wrap("bridge call");

        assert!(err.is_out_of_gas());
        assert!(!err.is_unauthorized());
        assert_eq!(
            err.to_string(),
            "bridge call: consume gas: out of gas: limit 10, consumed 10, requested 5"
        );
    }

    #[test]
    fn test_result_ext_context() {
        let res: Result<()> = Err(Error::Unauthorized("incorrect number of signers".into()));
        let err = res.context("failed to dispatch message").unwrap_err();
        assert!(err.is_unauthorized());
        assert!(err.to_string().starts_with("failed to dispatch message: unauthorized"));
    }

    #[test]
    fn test_from_panic_payload() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert!(matches!(Error::from_panic(payload), Error::Panic(m) if m == "boom"));
    }
}
