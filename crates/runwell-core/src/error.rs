//! Error model for the task runtime.
//!
//! Two kinds of failure flow through the runtime:
//!
//! - **Retryable errors**: anything a task returns that the runner may try
//!   again after a backoff wait.
//! - **Runtime errors**: programmer or environment faults (panics, type
//!   mismatches, invariant violations) that no amount of retrying will fix.
//!
//! Sibling failures from concurrent sub-tasks are collected into a joined
//! error that stays flat and preserves element order. Runtime errors are
//! sticky: a joined error transitively containing one is itself terminal.

/// An error produced by a task or by the runtime itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A retryable task failure.
    #[error("{0}")]
    Message(String),
    /// A non-retryable fault: panic, coercion failure, invariant violation.
    #[error("{0}")]
    Runtime(String),
    /// Multiple sibling failures, flattened. Never nested.
    #[error("{}", format_list(.0))]
    Join(Vec<Error>),
}

fn format_list(errors: &[Error]) -> String {
    let mut out = String::from("[");
    for (i, err) in errors.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&err.to_string());
    }
    out.push(']');
    out
}

impl Error {
    /// A retryable error with the given message.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }

    /// A runtime error with the given message.
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(message.into())
    }

    /// Joins errors into one, flattening any joined elements and suppressing
    /// emptiness: no errors yield `None`, a single error is returned as
    /// itself, more become a flat [`Error::Join`] in input order.
    pub fn join(errors: impl IntoIterator<Item = Error>) -> Option<Error> {
        let mut leaves = Vec::new();
        for err in errors {
            leaves.extend(err.into_leaves());
        }
        match leaves.len() {
            0 => None,
            1 => leaves.pop(),
            _ => Some(Error::Join(leaves)),
        }
    }

    /// Appends `err` to an accumulator, flattening joined errors on both
    /// sides. The usual shape is `acc = Some(Error::append(acc, err))`.
    pub fn append(acc: Option<Error>, err: Error) -> Error {
        let Some(prev) = acc else {
            return err;
        };
        let mut leaves = prev.into_leaves();
        leaves.extend(err.into_leaves());
        if leaves.len() == 1 {
            leaves.remove(0)
        } else {
            Error::Join(leaves)
        }
    }

    /// True iff this error is a runtime error, or a joined error transitively
    /// containing one. Runtime errors terminate the retry loop.
    pub fn is_runtime(&self) -> bool {
        match self {
            Error::Runtime(_) => true,
            Error::Join(errors) => errors.iter().any(Error::is_runtime),
            Error::Message(_) => false,
        }
    }

    fn into_leaves(self) -> Vec<Error> {
        match self {
            Error::Join(errors) => errors,
            other => vec![other],
        }
    }
}
