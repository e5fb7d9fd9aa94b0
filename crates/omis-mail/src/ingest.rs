use std::collections::HashMap;
use std::fmt;

use omis_core::{CoreError, RequestStatus, RequestStore, UpdateOutcome};

use crate::interface::{MailQuery, Mailbox, RawMail};
use crate::parser::{parse_mail, ContractorMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Applied {
        status: Option<RequestStatus>,
        comment_updated: bool,
    },
    Unchanged,
    Unmatched,
    Skipped { reason: String },
    Superseded,
    Failed { reason: String },
}

/// Outcome for one fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestLine {
    pub sender: String,
    pub subject: String,
    pub request_number: Option<String>,
    pub position_number: Option<String>,
    pub outcome: IngestOutcome,
}

impl fmt::Display for IngestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match (&self.request_number, &self.position_number) {
            (Some(request), Some(position)) => format!("request {request} position {position}"),
            (Some(request), None) => format!("request {request}"),
            _ => format!("message from {}", display_or(&self.sender, "unknown sender")),
        };
        match &self.outcome {
            IngestOutcome::Applied {
                status,
                comment_updated,
            } => {
                let mut changes = Vec::new();
                if let Some(status) = status {
                    changes.push(format!("status -> {status}"));
                }
                if *comment_updated {
                    changes.push("comment updated".to_owned());
                }
                write!(f, "{target}: {}", changes.join("; "))
            }
            IngestOutcome::Unchanged => write!(f, "{target}: already up to date"),
            IngestOutcome::Unmatched => write!(f, "{target}: no matching request record"),
            IngestOutcome::Skipped { reason } => write!(
                f,
                "{target}: skipped ({reason}; subject={})",
                display_or(&self.subject, "<empty>")
            ),
            IngestOutcome::Superseded => {
                write!(f, "{target}: superseded by a later message")
            }
            IngestOutcome::Failed { reason } => write!(f, "{target}: failed ({reason})"),
        }
    }
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub backend: String,
    pub lines: Vec<IngestLine>,
    pub fetch_error: Option<String>,
}

impl IngestReport {
    fn count(&self, matches: impl Fn(&IngestOutcome) -> bool) -> usize {
        self.lines.iter().filter(|line| matches(&line.outcome)).count()
    }

    pub fn applied(&self) -> usize {
        self.count(|outcome| matches!(outcome, IngestOutcome::Applied { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|outcome| matches!(outcome, IngestOutcome::Unchanged))
    }

    pub fn unmatched(&self) -> usize {
        self.count(|outcome| matches!(outcome, IngestOutcome::Unmatched))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, IngestOutcome::Skipped { .. }))
    }

    pub fn superseded(&self) -> usize {
        self.count(|outcome| matches!(outcome, IngestOutcome::Superseded))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, IngestOutcome::Failed { .. }))
    }

    pub fn summary_lines(&self) -> Vec<String> {
        self.lines.iter().map(ToString::to_string).collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} messages via {}: {} applied, {} unchanged, {} unmatched, {} skipped, {} superseded, {} failed",
            self.lines.len(),
            self.backend,
            self.applied(),
            self.unchanged(),
            self.unmatched(),
            self.skipped(),
            self.superseded(),
            self.failed()
        )
    }
}

/// One mailbox scan: fetch, parse, collapse per pair, apply.
pub struct MailIngester {
    mailbox: Box<dyn Mailbox>,
    query: MailQuery,
}

impl MailIngester {
    pub fn new(mailbox: Box<dyn Mailbox>, query: MailQuery) -> Self {
        Self { mailbox, query }
    }

    pub fn backend_key(&self) -> &'static str {
        self.mailbox.backend_key()
    }

    pub async fn run(&self, store: &mut dyn RequestStore) -> Result<IngestReport, CoreError> {
        let mails = match self.mailbox.fetch(&self.query).await {
            Ok(mails) => mails,
            Err(error) => {
                tracing::warn!(
                    backend = self.backend_key(),
                    %error,
                    "mailbox fetch failed; nothing to ingest"
                );
                return Ok(IngestReport {
                    backend: self.backend_key().to_owned(),
                    lines: Vec::new(),
                    fetch_error: Some(error.to_string()),
                });
            }
        };
        tracing::info!(
            backend = self.backend_key(),
            count = mails.len(),
            "fetched contractor messages"
        );

        let mut report = apply_messages(store, &mails)?;
        report.backend = self.backend_key().to_owned();
        tracing::info!(backend = self.backend_key(), "{}", report.summary());
        Ok(report)
    }
}

/// Applies already fetched messages. Within one pass the message with the
/// latest `received_at` wins for each pair; ties keep fetch order and the
/// later one wins. A store error on one message is recorded as
/// [`IngestOutcome::Failed`] and the pass moves on.
pub fn apply_messages(
    store: &mut dyn RequestStore,
    mails: &[RawMail],
) -> Result<IngestReport, CoreError> {
    let mut lines: Vec<Option<IngestLine>> = vec![None; mails.len()];
    let mut parsed: Vec<(usize, ContractorMessage)> = Vec::new();

    for (index, mail) in mails.iter().enumerate() {
        match parse_mail(mail) {
            Ok(message) => parsed.push((index, message)),
            Err(error) => {
                tracing::warn!(
                    sender = mail.sender.as_str(),
                    subject = mail.subject.as_str(),
                    %error,
                    "skipping contractor message"
                );
                lines[index] = Some(IngestLine {
                    sender: mail.sender.clone(),
                    subject: mail.subject.clone(),
                    request_number: None,
                    position_number: None,
                    outcome: IngestOutcome::Skipped {
                        reason: error.to_string(),
                    },
                });
            }
        }
    }

    parsed.sort_by(|(_, left), (_, right)| left.received_at.cmp(&right.received_at));
    let mut winners: HashMap<(String, String), usize> = HashMap::new();
    for (position, (_, message)) in parsed.iter().enumerate() {
        winners.insert(
            (
                message.request_number.clone(),
                message.position_number.clone(),
            ),
            position,
        );
    }

    for (position, (index, message)) in parsed.iter().enumerate() {
        let key = (
            message.request_number.clone(),
            message.position_number.clone(),
        );
        let outcome = if winners.get(&key) != Some(&position) {
            IngestOutcome::Superseded
        } else {
            apply_message(store, message).unwrap_or_else(|error| {
                tracing::error!(
                    request_number = message.request_number.as_str(),
                    position_number = message.position_number.as_str(),
                    %error,
                    "failed to apply contractor message"
                );
                IngestOutcome::Failed {
                    reason: error.to_string(),
                }
            })
        };
        lines[*index] = Some(IngestLine {
            sender: mails[*index].sender.clone(),
            subject: message.subject.clone(),
            request_number: Some(message.request_number.clone()),
            position_number: Some(message.position_number.clone()),
            outcome,
        });
    }

    Ok(IngestReport {
        backend: String::new(),
        lines: lines.into_iter().flatten().collect(),
        fetch_error: None,
    })
}

fn apply_message(
    store: &mut dyn RequestStore,
    message: &ContractorMessage,
) -> Result<IngestOutcome, CoreError> {
    let (request_number, position_number) = message.pair();

    let status_outcome = match message.status {
        Some(status) => store.update_status(request_number, position_number, status)?,
        None => UpdateOutcome::Unchanged,
    };
    if !status_outcome.found() {
        return Ok(unmatched(message));
    }

    let comment_outcome = store.update_comment(
        request_number,
        position_number,
        &message.comment,
        message.author.as_deref(),
    )?;
    if !comment_outcome.found() {
        return Ok(unmatched(message));
    }

    if status_outcome.changed() || comment_outcome.changed() {
        tracing::info!(
            request_number,
            position_number,
            status = ?message.status,
            comment_updated = comment_outcome.changed(),
            "contractor message applied"
        );
        Ok(IngestOutcome::Applied {
            status: message.status.filter(|_| status_outcome.changed()),
            comment_updated: comment_outcome.changed(),
        })
    } else {
        Ok(IngestOutcome::Unchanged)
    }
}

fn unmatched(message: &ContractorMessage) -> IngestOutcome {
    tracing::warn!(
        request_number = message.request_number.as_str(),
        position_number = message.position_number.as_str(),
        "contractor message does not match any request"
    );
    IngestOutcome::Unmatched
}

#[cfg(test)]
mod tests {
    use super::{apply_messages, IngestLine, IngestOutcome, IngestReport};
    use crate::interface::RawMail;
    use omis_core::test_support::FixedClock;
    use omis_core::{
        CoreError, NewRequest, RequestRecord, RequestStatus, RequestStore, SqliteRequestStore,
        UpdateOutcome,
    };
    use time::macros::datetime;
    use time::OffsetDateTime;

    fn mail(subject: &str, body: &str, received_at: OffsetDateTime) -> RawMail {
        RawMail {
            subject: subject.to_owned(),
            body: body.to_owned(),
            sender: "contractor@example.com".to_owned(),
            received_at,
        }
    }

    fn store() -> SqliteRequestStore {
        let clock = FixedClock::shared(datetime!(2025-09-27 09:00:00 UTC));
        SqliteRequestStore::in_memory_with_clock(clock).expect("store")
    }

    #[test]
    fn latest_message_per_pair_wins_regardless_of_fetch_order() {
        let mut store = store();
        store.add(NewRequest::new("R-1", "P-1")).expect("add");

        let mails = vec![
            mail("Request R-1 departed", "Position P-1", datetime!(2025-09-27 12:00:00 UTC)),
            mail("Request R-1 en route", "Position P-1", datetime!(2025-09-27 10:00:00 UTC)),
        ];
        let report = apply_messages(&mut store, &mails).expect("apply");

        assert_eq!(
            report.lines[0].outcome,
            IngestOutcome::Applied {
                status: Some(RequestStatus::Departed),
                comment_updated: true,
            }
        );
        assert_eq!(report.lines[1].outcome, IngestOutcome::Superseded);
        let record = store.find("R-1", "P-1").expect("find").expect("record");
        assert_eq!(record.status, RequestStatus::Departed);
        assert_eq!(record.comment.as_deref(), Some("Request R-1 departed - Position P-1"));
    }

    #[test]
    fn equal_timestamps_keep_fetch_order_and_later_message_wins() {
        let mut store = store();
        store.add(NewRequest::new("R-1", "P-1")).expect("add");
        let at = datetime!(2025-09-27 10:00:00 UTC);

        let mails = vec![
            mail("Request R-1 accepted", "Position P-1", at),
            mail("Request R-1 on site", "Position P-1", at),
        ];
        let report = apply_messages(&mut store, &mails).expect("apply");

        assert_eq!(report.superseded(), 1);
        let record = store.find("R-1", "P-1").expect("find").expect("record");
        assert_eq!(record.status, RequestStatus::OnSite);
    }

    #[test]
    fn unmatched_and_malformed_messages_are_reported_not_fatal() {
        let mut store = store();
        let before = store.list().expect("list");

        let mails = vec![
            mail("Request R-404 accepted", "Position P-1", datetime!(2025-09-27 10:00:00 UTC)),
            mail("Hello there", "No identifiers", datetime!(2025-09-27 10:05:00 UTC)),
        ];
        let report = apply_messages(&mut store, &mails).expect("apply");

        assert_eq!(report.unmatched(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(store.list().expect("list"), before);
        assert!(report.lines[1].to_string().contains("skipped"));
    }

    #[test]
    fn message_without_status_keyword_only_updates_comment() {
        let mut store = store();
        store.add(NewRequest::new("R-5", "P-2")).expect("add");

        let report = apply_messages(
            &mut store,
            &[mail("Request R-5", "Position P-2 call me back", datetime!(2025-09-27 10:00:00 UTC))],
        )
        .expect("apply");

        assert_eq!(
            report.lines[0].outcome,
            IngestOutcome::Applied {
                status: None,
                comment_updated: true,
            }
        );
        let record = store.find("R-5", "P-2").expect("find").expect("record");
        assert_eq!(record.status, RequestStatus::Submitted);
        assert_eq!(record.comment_author.as_deref(), Some("contractor@example.com"));
    }

    /// Delegates to SQLite but refuses writes for one pair.
    struct FailingPairStore {
        inner: SqliteRequestStore,
        request_number: &'static str,
    }

    impl FailingPairStore {
        fn check(&self, request_number: &str) -> Result<(), CoreError> {
            if request_number == self.request_number {
                Err(CoreError::Persistence("disk I/O error".to_owned()))
            } else {
                Ok(())
            }
        }
    }

    impl RequestStore for FailingPairStore {
        fn add(&mut self, request: NewRequest) -> Result<i64, CoreError> {
            self.inner.add(request)
        }

        fn list(&self) -> Result<Vec<RequestRecord>, CoreError> {
            self.inner.list()
        }

        fn find(
            &self,
            request_number: &str,
            position_number: &str,
        ) -> Result<Option<RequestRecord>, CoreError> {
            self.inner.find(request_number, position_number)
        }

        fn update_status(
            &mut self,
            request_number: &str,
            position_number: &str,
            status: RequestStatus,
        ) -> Result<UpdateOutcome, CoreError> {
            self.check(request_number)?;
            self.inner.update_status(request_number, position_number, status)
        }

        fn update_comment(
            &mut self,
            request_number: &str,
            position_number: &str,
            comment: &str,
            author: Option<&str>,
        ) -> Result<UpdateOutcome, CoreError> {
            self.check(request_number)?;
            self.inner
                .update_comment(request_number, position_number, comment, author)
        }

        fn delayed(&self, minutes: u64) -> Result<Vec<RequestRecord>, CoreError> {
            self.inner.delayed(minutes)
        }
    }

    #[test]
    fn store_failure_on_one_pair_does_not_abort_the_pass() {
        let mut store = FailingPairStore {
            inner: store(),
            request_number: "R-1",
        };
        store.add(NewRequest::new("R-1", "P-1")).expect("add");
        store.add(NewRequest::new("R-2", "P-1")).expect("add");

        let mails = vec![
            mail("Request R-1 departed", "Position P-1", datetime!(2025-09-27 10:00:00 UTC)),
            mail("Request R-2 departed", "Position P-1", datetime!(2025-09-27 10:05:00 UTC)),
        ];
        let mut report = apply_messages(&mut store, &mails).expect("apply");
        report.backend = "mail.fake".to_owned();

        assert!(matches!(
            &report.lines[0].outcome,
            IngestOutcome::Failed { reason } if reason.contains("disk I/O error")
        ));
        assert_eq!(report.failed(), 1);
        assert_eq!(report.applied(), 1);
        assert_eq!(
            report.summary(),
            "2 messages via mail.fake: 1 applied, 0 unchanged, 0 unmatched, 0 skipped, 0 superseded, 1 failed"
        );
        assert!(report.summary_lines()[0].starts_with("request R-1 position P-1: failed"));
        let record = store.find("R-2", "P-1").expect("find").expect("record");
        assert_eq!(record.status, RequestStatus::Departed);
    }

    #[test]
    fn summary_counts_every_outcome() {
        let report = IngestReport {
            backend: "mail.fake".to_owned(),
            lines: vec![
                IngestLine {
                    sender: "a@example.com".to_owned(),
                    subject: "s".to_owned(),
                    request_number: Some("1".to_owned()),
                    position_number: Some("2".to_owned()),
                    outcome: IngestOutcome::Unchanged,
                },
                IngestLine {
                    sender: "a@example.com".to_owned(),
                    subject: "s".to_owned(),
                    request_number: Some("1".to_owned()),
                    position_number: Some("2".to_owned()),
                    outcome: IngestOutcome::Superseded,
                },
            ],
            fetch_error: None,
        };

        assert_eq!(
            report.summary(),
            "2 messages via mail.fake: 0 applied, 1 unchanged, 0 unmatched, 0 skipped, 1 superseded, 0 failed"
        );
        assert_eq!(
            report.summary_lines()[0],
            "request 1 position 2: already up to date"
        );
    }
}
