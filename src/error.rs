use std::io::ErrorKind;

use thiserror::Error;

/// Reasons a [`RunSpecification`](crate::run::RunSpecification) is rejected.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RunSpecError {
    #[error("month {0} is outside 1..=12")]
    InvalidMonth(u32),
    #[error("day {day} does not exist in {year}-{month:02}")]
    InvalidDay { year: u32, month: u32, day: u32 },
    #[error("cycle hour {0} is outside 0..=23")]
    InvalidCycle(u32),
    #[error("forecast hour step must be positive")]
    ZeroStep,
    #[error("forecast hour end {end} is before start {start}")]
    EndBeforeStart { start: u32, end: u32 },
    #[error("forecast hour {0} does not fit in three digits")]
    HourOutOfRange(u32),
}

/// Everything that can go wrong while talking to the remote or writing the
/// local copy. None of these stop an acquisition, they only delay it.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("storage error: {0}")]
    Store(#[from] object_store::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response header: {0}")]
    MalformedHeader(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid store: {0}")]
    InvalidStore(String),
}

/// How a fault is reported before it is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Expected on a flaky network or a busy server.
    Transient,
    /// Not expected during normal operation; worth someone's attention.
    Unexpected,
}

impl FetchError {
    pub fn class(&self) -> FaultClass {
        match self {
            FetchError::Store(e) => match e {
                // Download failures, including an error status on the GET,
                // surface as generic errors from the http client.
                object_store::Error::Generic { .. } => FaultClass::Transient,
                object_store::Error::NotFound { .. } => FaultClass::Transient,
                _ => FaultClass::Unexpected,
            },
            // Status codes never get here, probes turn them into absence.
            FetchError::Http(e) if e.is_builder() => FaultClass::Unexpected,
            FetchError::Http(_) => FaultClass::Transient,
            FetchError::MalformedHeader(_) => FaultClass::Transient,
            FetchError::Io(e) => match e.kind() {
                ErrorKind::TimedOut
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::UnexpectedEof
                | ErrorKind::Interrupted => FaultClass::Transient,
                _ => FaultClass::Unexpected,
            },
            FetchError::Url(_) | FetchError::InvalidStore(_) => FaultClass::Unexpected,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == FaultClass::Transient
    }
}
