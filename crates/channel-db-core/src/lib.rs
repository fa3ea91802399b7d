use serde::Serialize;

pub mod ids;
pub mod model;
pub mod mutation;
mod patterns;
pub mod probe;
pub mod request;
pub mod run;
pub mod store;
pub mod txn;
pub mod validate;

pub use ids::{derive_channel_id, derive_feed_id, slug};
pub use model::{
    BlocklistRecord, Category, Channel, City, Country, Feed, Language, Logo, Record, Region, Row,
    Subdivision, Table, Timezone,
};
pub use probe::{ExtensionProbe, ImageInfo, ImageProbe};
pub use request::{Action, ChangeRequest, Field, RequestFields, CLEAR_SENTINEL};
pub use run::{apply_requests, LogEntry, LogLevel, RunReport};
pub use store::{Collection, DataStore};
pub use txn::Transaction;
pub use validate::{validate, ValidationReport, Violation};

/// One defective physical line of a table file.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct RowDefect {
    pub line: usize,
    pub message: String,
}

/// Fatal failure while turning table files into a [`DataStore`].
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum LoadError {
    #[error("{file}: {} malformed row(s)", defects.len())]
    MalformedRows { file: String, defects: Vec<RowDefect> },
    #[error("{file}:{line}: invalid value {value:?} in column `{column}`")]
    InvalidValue { file: String, line: usize, column: String, value: String },
    #[error("{file}: {message}")]
    Parse { file: String, message: String },
}

impl LoadError {
    /// File name the error was raised for.
    #[must_use]
    pub fn file(&self) -> &str {
        match self {
            Self::MalformedRows { file, .. }
            | Self::InvalidValue { file, .. }
            | Self::Parse { file, .. } => file,
        }
    }

    /// Line-tagged defects, in the shape the `validate`/`update` commands print.
    #[must_use]
    pub fn defects(&self) -> Vec<RowDefect> {
        match self {
            Self::MalformedRows { defects, .. } => defects.clone(),
            Self::InvalidValue { line, column, value, .. } => vec![RowDefect {
                line: *line,
                message: format!("\"{column}\" has an invalid value \"{value}\""),
            }],
            Self::Parse { message, .. } => vec![RowDefect { line: 1, message: message.clone() }],
        }
    }
}

/// Why a change request could not be applied. The request is skipped, the batch goes on.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RequestError {
    #[error("request is not approved")]
    NotApproved,
    #[error("request has no action label")]
    NoAction,
    #[error("request has more than one action label: {0}")]
    AmbiguousAction(String),
    #[error("missing required field \"{0}\"")]
    MissingField(&'static str),
    #[error("invalid value \"{value}\" for field \"{field}\"")]
    InvalidField { field: &'static str, value: String },
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    Duplicate(String),
}
