use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Fixed status vocabulary of a request record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    #[serde(rename = "submitted")]
    Submitted,
    #[serde(rename = "accepted")]
    Accepted,
    #[serde(rename = "in review")]
    InReview,
    #[serde(rename = "en route")]
    EnRoute,
    #[serde(rename = "on site")]
    OnSite,
    #[serde(rename = "departed")]
    Departed,
}

impl RequestStatus {
    pub const INITIAL: Self = Self::Submitted;

    pub const ALL: [Self; 6] = [
        Self::Submitted,
        Self::Accepted,
        Self::InReview,
        Self::EnRoute,
        Self::OnSite,
        Self::Departed,
    ];

    pub const fn as_key(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Accepted => "accepted",
            Self::InReview => "in review",
            Self::EnRoute => "en route",
            Self::OnSite => "on site",
            Self::Departed => "departed",
        }
    }

    /// Accepts canonical keys (case-insensitive, `_`/`-` read as spaces) and the
    /// Russian labels written by the first generation of the tracker.
    pub fn from_key(value: &str) -> Option<Self> {
        let normalized = value
            .trim()
            .to_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match normalized.as_str() {
            "submitted" | "заявка отправлена" => Some(Self::Submitted),
            "accepted" | "заявка принята" => Some(Self::Accepted),
            "in review" | "на рассмотрении" => Some(Self::InReview),
            "en route" | "подрядчик в пути" => Some(Self::EnRoute),
            "on site" | "подрядчик на месте" => Some(Self::OnSite),
            "departed" | "подрядчик убыл" => Some(Self::Departed),
            _ => None,
        }
    }

    pub(crate) const fn legacy_label(self) -> &'static str {
        match self {
            Self::Submitted => "заявка отправлена",
            Self::Accepted => "заявка принята",
            Self::InReview => "на рассмотрении",
            Self::EnRoute => "подрядчик в пути",
            Self::OnSite => "подрядчик на месте",
            Self::Departed => "подрядчик убыл",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_key())
    }
}

impl FromStr for RequestStatus {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_key(value).ok_or_else(|| {
            let expected = Self::ALL
                .iter()
                .map(|status| status.as_key())
                .collect::<Vec<_>>()
                .join(", ");
            CoreError::Validation(format!(
                "unknown request status '{}'; expected one of: {expected}",
                value.trim()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RequestStatus;

    #[test]
    fn keys_roundtrip_through_from_key() {
        for status in RequestStatus::ALL {
            assert_eq!(RequestStatus::from_key(status.as_key()), Some(status));
        }
    }

    #[test]
    fn from_key_normalizes_case_and_separators() {
        assert_eq!(
            RequestStatus::from_key("  IN_REVIEW "),
            Some(RequestStatus::InReview)
        );
        assert_eq!(
            RequestStatus::from_key("En-Route"),
            Some(RequestStatus::EnRoute)
        );
    }

    #[test]
    fn from_key_accepts_legacy_labels() {
        for status in RequestStatus::ALL {
            assert_eq!(RequestStatus::from_key(status.legacy_label()), Some(status));
        }
    }

    #[test]
    fn from_str_rejects_unknown_status_with_vocabulary_hint() {
        let error = "cancelled"
            .parse::<RequestStatus>()
            .expect_err("unknown status must be rejected");
        let detail = error.to_string();
        assert!(detail.contains("cancelled"));
        assert!(detail.contains("submitted"));
        assert!(detail.contains("departed"));
    }

    #[test]
    fn display_renders_canonical_key() {
        assert_eq!(RequestStatus::OnSite.to_string(), "on site");
        assert_eq!(RequestStatus::INITIAL.to_string(), "submitted");
    }
}
