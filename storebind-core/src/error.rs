//! Error types for store bindings.

use std::error::Error as StdError;
use std::fmt::Write as _;

use thiserror::Error;

/// The error type selectors return.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The selector failed while deriving a value for a render attempt.
    ///
    /// `previous` carries the details of a failure the change detector
    /// recorded before this render, when there was one.
    #[error("selector failed: {source}{}", correlation(.previous))]
    Selector {
        source: BoxError,
        previous: Option<String>,
    },

    #[error("You must pass a selector to use_store_state")]
    MissingSelector,

    #[error("store binding has been torn down")]
    TornDown,

    #[error("render attempt belongs to binding {rendered}, but the instance is bound to {current}")]
    StaleRender { rendered: u64, current: u64 },

    #[error("invalid sync options: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error came out of the selector rather than from misuse.
    pub fn is_selector(&self) -> bool {
        matches!(self, Error::Selector { .. })
    }

    /// Details of the previously recorded selector failure, if any.
    pub fn previous(&self) -> Option<&str> {
        match self {
            Error::Selector { previous, .. } => previous.as_deref(),
            _ => None,
        }
    }
}

fn correlation(previous: &Option<String>) -> String {
    match previous {
        Some(details) => format!(
            "\nThe error may be correlated with this previous error:\n{details}\n\n"
        ),
        None => String::new(),
    }
}

/// Render an error and its source chain into one report.
pub(crate) fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut report = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(report, "\n  caused by: {cause}");
        source = cause.source();
    }
    report
}
