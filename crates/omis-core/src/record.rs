use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::CoreError;
use crate::status::RequestStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: i64,
    pub request_number: String,
    pub position_number: String,
    pub comment: Option<String>,
    pub comment_author: Option<String>,
    pub status: RequestStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub status_updated_at: OffsetDateTime,
}

impl RequestRecord {
    pub fn label(&self) -> String {
        format!("{}/{}", self.request_number, self.position_number)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub request_number: String,
    pub position_number: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub comment_author: Option<String>,
}

impl NewRequest {
    pub fn new(request_number: impl Into<String>, position_number: impl Into<String>) -> Self {
        Self {
            request_number: request_number.into(),
            position_number: position_number.into(),
            comment: None,
            comment_author: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.comment_author = Some(author.into());
        self
    }

    /// Trims every field, turns blank optional text into `None` and rejects
    /// blank identifiers.
    pub fn normalized(self) -> Result<Self, CoreError> {
        let request_number = self.request_number.trim().to_owned();
        let position_number = self.position_number.trim().to_owned();
        if request_number.is_empty() || position_number.is_empty() {
            return Err(CoreError::Validation(
                "request number and position number are required".to_owned(),
            ));
        }

        Ok(Self {
            request_number,
            position_number,
            comment: non_blank(self.comment),
            comment_author: non_blank(self.comment_author),
        })
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Result of an update against a `(request number, position number)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    NotFound,
    Unchanged,
    Updated,
}

impl UpdateOutcome {
    pub fn found(self) -> bool {
        !matches!(self, Self::NotFound)
    }

    pub fn changed(self) -> bool {
        matches!(self, Self::Updated)
    }
}
