use std::{fmt, time::Duration};

use thiserror::Error;

use crate::telemetry::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: Field,
    pub problem: FieldProblem,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.problem {
            FieldProblem::Missing => write!(f, "{}: required", self.field),
            FieldProblem::WrongType { expected, found } => {
                write!(f, "{}: expected {expected}, got {found}", self.field)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid sensor record: {}", join_issues(.issues))]
pub struct SchemaValidationError {
    pub issues: Vec<FieldIssue>,
}

impl SchemaValidationError {
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.issues.iter().map(|i| i.field)
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sensor id is not numeric: {input:?}")]
pub struct TypeCoercionError {
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("expected 4 '/'-separated fields, got {0}")]
    WrongArity(usize),

    #[error("{0} is empty")]
    EmptyFragment(&'static str),

    #[error("value is not a decimal number: {value:?}")]
    InvalidValue {
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("value is not finite: {0:?}")]
    NonFinite(String),
}

#[derive(Debug, Error)]
pub enum BrokerSubscribeError {
    #[error("failed to send subscribe request for {topic}")]
    Request {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },

    #[error("broker rejected subscription to {topic}")]
    Rejected { topic: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("realtime store state is poisoned")]
    Poisoned,

    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("store task did not complete: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("record date is not an RFC 3339 timestamp: {date:?}")]
    InvalidDate {
        date: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("sink did not answer within {0:?}")]
    Timeout(Duration),

    #[error("sink rejected record: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read sensor record: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaValidationError),

    #[error(transparent)]
    Coercion(#[from] TypeCoercionError),

    #[error("failed to save sensor record: {0}")]
    Sink(#[from] SinkError),
}
