use serde::Serialize;

/// How far a batch operation got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Succeeded,
    PartiallySucceeded,
    /// The store became unreachable mid-batch. Work committed before that point stays.
    Aborted,
}

impl Completion {
    pub fn from_parts(failures: &[ItemFailure], aborted: bool) -> Self {
        if aborted {
            Self::Aborted
        } else if failures.is_empty() {
            Self::Succeeded
        } else {
            Self::PartiallySucceeded
        }
    }
}

/// One item a batch could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub subject: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(subject: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }
}
