//! Error types and error handling strategy for Fibra.
//!
//! This module defines the single error type used throughout the runtime.
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Cancellation is an error kind, not a silent drop
//! - Callback failures are reported to the background sink, never thrown
//!   across loop state

use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation was cancelled (token throw, promise cancel, fiber cancel,
    /// timeout cancel).
    Cancelled,
    /// An ordered collection of underlying errors.
    Aggregate,
    /// Caller passed an invalid argument (empty race, zero timeout, ...).
    InvalidArgument,
    /// Operation on a disposed token source.
    Disposed,
    /// Unwrap on a promise that is not in the expected state.
    WrongState,
    /// Second settlement of a deferred.
    AlreadySettled,
    /// User-provided error.
    User,
}

impl ErrorKind {
    /// Returns a short static name for the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Aggregate => "aggregate",
            Self::InvalidArgument => "invalid argument",
            Self::Disposed => "disposed",
            Self::WrongState => "wrong state",
            Self::AlreadySettled => "already settled",
            Self::User => "user",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The main error type for Fibra operations.
///
/// Rejection payloads, token throws, and combinator failures are all values
/// of this type. Aggregate errors carry an ordered list of inner errors.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    code: Option<i32>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    inner: Vec<Error>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            code: None,
            source: None,
            inner: Vec::new(),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this error is an aggregate.
    #[must_use]
    pub const fn is_aggregate(&self) -> bool {
        matches!(self.kind, ErrorKind::Aggregate)
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a numeric code (signal number for signal cancellations).
    #[must_use]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the context text, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns the numeric code, if any.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        self.code
    }

    /// Returns the context text, or the kind name when no context is set.
    #[must_use]
    pub fn message(&self) -> &str {
        self.context.as_deref().unwrap_or_else(|| self.kind.name())
    }

    // === Cancellation constructors ===

    /// Creates a cancellation error with the given reason.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled).with_context(reason)
    }

    /// Creates a cancellation error with the default token message.
    #[must_use]
    pub fn cancelled_default() -> Self {
        Self::cancelled("Operation was cancelled")
    }

    /// Creates the cancellation error produced by `Promise::cancel`.
    #[must_use]
    pub fn promise_cancelled() -> Self {
        Self::cancelled("Promise was cancelled")
    }

    /// Creates a timeout cancellation error.
    #[must_use]
    pub fn timeout(ms: u64) -> Self {
        Self::cancelled(format!("Timeout of {ms} milliseconds exceeded"))
    }

    /// Creates a signal cancellation error; the signal number is the code.
    #[must_use]
    pub fn signal(sig: i32) -> Self {
        Self::cancelled(format!("Received signal {sig}")).with_code(sig)
    }

    // === Other constructors ===

    /// Creates an aggregate error over an ordered list of inner errors.
    #[must_use]
    pub fn aggregate(message: impl Into<String>, inner: Vec<Self>) -> Self {
        let mut err = Self::new(ErrorKind::Aggregate).with_context(message);
        err.inner = inner;
        err
    }

    /// Creates an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument).with_context(message)
    }

    /// Creates a disposed error.
    #[must_use]
    pub fn disposed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Disposed).with_context(message)
    }

    /// Creates a wrong-state error.
    #[must_use]
    pub fn wrong_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WrongState).with_context(message)
    }

    /// Creates an already-settled error.
    #[must_use]
    pub fn already_settled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadySettled).with_context(message)
    }

    /// Creates a user error.
    #[must_use]
    pub fn user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_context(message)
    }

    // === Aggregate introspection ===

    /// Returns the number of inner errors.
    #[must_use]
    pub fn inner_len(&self) -> usize {
        self.inner.len()
    }

    /// Returns the ordered list of inner errors.
    #[must_use]
    pub fn inner(&self) -> &[Self] {
        &self.inner
    }

    /// Returns the inner error at the given index.
    #[must_use]
    pub fn inner_at(&self, index: usize) -> Option<&Self> {
        self.inner.get(index)
    }

    /// Returns the messages of the inner errors, in order.
    #[must_use]
    pub fn inner_messages(&self) -> Vec<String> {
        self.inner.iter().map(|e| e.message().to_owned()).collect()
    }

    /// Returns the inner errors of the given kind, in order.
    #[must_use]
    pub fn errors_of_kind(&self, kind: ErrorKind) -> Vec<&Self> {
        self.inner.iter().filter(|e| e.kind == kind).collect()
    }

    /// Returns true if any inner error has the given kind.
    #[must_use]
    pub fn contains_kind(&self, kind: ErrorKind) -> bool {
        self.inner.iter().any(|e| e.kind == kind)
    }

    /// Recursively inlines nested aggregates into a single flat inner list.
    ///
    /// Idempotent: flattening a flattened aggregate is a no-op, and the
    /// result never contains a nested aggregate. Non-aggregate errors are
    /// returned unchanged.
    #[must_use]
    pub fn flatten(&self) -> Self {
        fn collect(errors: &[Error], out: &mut Vec<Error>) {
            for e in errors {
                if e.is_aggregate() {
                    collect(&e.inner, out);
                } else {
                    out.push(e.clone());
                }
            }
        }

        if !self.is_aggregate() {
            return self.clone();
        }
        let mut flat = Vec::new();
        collect(&self.inner, &mut flat);
        let mut err = self.clone();
        err.inner = flat;
        err
    }

    /// Returns a multi-line formatted form: the message followed by one
    /// indented line per inner error.
    #[must_use]
    pub fn detail(&self) -> String {
        use fmt::Write as _;

        let mut out = String::new();
        let _ = write!(out, "{self}");
        for (i, e) in self.inner.iter().enumerate() {
            let _ = write!(out, "\n  [{i}] {e}");
        }
        out
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        if self.is_aggregate() {
            write!(f, " ({} inner errors)", self.inner.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Convenience alias for fallible Fibra operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
