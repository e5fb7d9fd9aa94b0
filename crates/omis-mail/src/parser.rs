use std::sync::OnceLock;

use omis_core::RequestStatus;
use regex::Regex;
use thiserror::Error;
use time::OffsetDateTime;

use crate::interface::RawMail;

const FALLBACK_COMMENT: &str = "Contractor message";

/// Checked in order; the first status with a matching keyword wins.
const STATUS_KEYWORDS: &[(RequestStatus, &[&str])] = &[
    (
        RequestStatus::Accepted,
        &["принят", "подтвержд", "accepted", "confirmed"],
    ),
    (
        RequestStatus::EnRoute,
        &["в пути", "выех", "en route", "on the way", "dispatched"],
    ),
    (
        RequestStatus::OnSite,
        &["на месте", "прибыл", "on site", "arrived"],
    ),
    (
        RequestStatus::Departed,
        &["убыл", "завершил", "законч", "departed", "completed", "finished"],
    ),
    (
        RequestStatus::InReview,
        &["на рассмотрении", "in review", "under review"],
    ),
];

/// Contractor update extracted from one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractorMessage {
    pub request_number: String,
    pub position_number: String,
    pub status: Option<RequestStatus>,
    pub comment: String,
    pub author: Option<String>,
    pub subject: String,
    pub received_at: OffsetDateTime,
}

impl ContractorMessage {
    pub fn pair(&self) -> (&str, &str) {
        (&self.request_number, &self.position_number)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("no request number found")]
    MissingRequestNumber,
    #[error("no position number found for request {request_number}")]
    MissingPositionNumber { request_number: String },
}

/// Keyword, up to 20 non-digit filler characters on the same line ("номер",
/// "N", "#"), then either plain digits or a hyphenated code such as `R-100`.
fn request_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:заявк\w*|requests?|req)\b[^\d\n]{0,20}?(?P<number>\p{L}+-\d+|\d+)")
            .expect("valid request number regex")
    })
}

fn position_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:позици\w*|positions?|pos)\b[^\d\n]{0,20}?(?P<number>\p{L}+-\d+|\d+)")
            .expect("valid position number regex")
    })
}

fn first_match(regex: &Regex, sources: [&str; 2]) -> Option<String> {
    sources.into_iter().find_map(|text| {
        regex
            .captures(text)
            .and_then(|captures| captures.name("number"))
            .map(|number| number.as_str().to_owned())
    })
}

pub fn detect_status(text: &str) -> Option<RequestStatus> {
    let lowered = text.to_lowercase();
    STATUS_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|(status, _)| *status)
}

pub fn compose_comment(subject: &str, body: &str) -> String {
    let subject = subject.trim();
    let first_line = body.trim().lines().next().unwrap_or_default().trim();
    let parts = [subject, first_line]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    if parts.is_empty() {
        FALLBACK_COMMENT.to_owned()
    } else {
        parts.join(" - ")
    }
}

pub fn parse_mail(mail: &RawMail) -> Result<ContractorMessage, ParseError> {
    let sources = [mail.subject.as_str(), mail.body.as_str()];
    let request_number =
        first_match(request_re(), sources).ok_or(ParseError::MissingRequestNumber)?;
    let position_number = first_match(position_re(), sources).ok_or_else(|| {
        ParseError::MissingPositionNumber {
            request_number: request_number.clone(),
        }
    })?;

    let sender = mail.sender.trim();
    Ok(ContractorMessage {
        request_number,
        position_number,
        status: detect_status(&format!("{} {}", mail.subject, mail.body)),
        comment: compose_comment(&mail.subject, &mail.body),
        author: Some(sender.to_owned()).filter(|sender| !sender.is_empty()),
        subject: mail.subject.trim().to_owned(),
        received_at: mail.received_at,
    })
}
