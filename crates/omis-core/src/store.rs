use std::path::Path;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use time::{Duration, OffsetDateTime};

use crate::clock::{truncate_to_seconds, Clock, SystemClock};
use crate::error::CoreError;
use crate::record::{non_blank, NewRequest, RequestRecord, UpdateOutcome};
use crate::status::RequestStatus;

mod codec;

use codec::{format_timestamp, parse_status, parse_timestamp};

const CURRENT_SCHEMA_VERSION: u32 = 1;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const RECORD_COLUMNS: &str = "id, request_number, position_number, comment, comment_author, status, created_at, status_updated_at";

/// Single point of access to persisted request records.
pub trait RequestStore: Send {
    fn add(&mut self, request: NewRequest) -> Result<i64, CoreError>;
    fn list(&self) -> Result<Vec<RequestRecord>, CoreError>;
    fn find(
        &self,
        request_number: &str,
        position_number: &str,
    ) -> Result<Option<RequestRecord>, CoreError>;
    fn update_status(
        &mut self,
        request_number: &str,
        position_number: &str,
        status: RequestStatus,
    ) -> Result<UpdateOutcome, CoreError>;
    fn update_comment(
        &mut self,
        request_number: &str,
        position_number: &str,
        comment: &str,
        author: Option<&str>,
    ) -> Result<UpdateOutcome, CoreError>;
    fn delayed(&self, minutes: u64) -> Result<Vec<RequestRecord>, CoreError>;
}

pub struct SqliteRequestStore {
    conn: Connection,
    clock: Arc<dyn Clock>,
}

impl SqliteRequestStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    CoreError::Persistence(format!(
                        "failed to create database directory '{}': {err}",
                        parent.display()
                    ))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|err| {
            CoreError::Persistence(format!(
                "failed to open database '{}': {err}",
                path.display()
            ))
        })?;
        let mut store = Self { conn, clock };
        store.bootstrap()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, CoreError> {
        Self::in_memory_with_clock(Arc::new(SystemClock))
    }

    pub fn in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(CoreError::persistence)?;
        let mut store = Self { conn, clock };
        store.bootstrap()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<u32, CoreError> {
        self.conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(CoreError::persistence)
    }

    fn now(&self) -> OffsetDateTime {
        truncate_to_seconds(self.clock.now())
    }

    fn bootstrap(&mut self) -> Result<(), CoreError> {
        self.conn
            .busy_timeout(StdDuration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .map_err(CoreError::persistence)?;

        let found = self.schema_version()?;
        if found > CURRENT_SCHEMA_VERSION {
            return Err(CoreError::UnsupportedSchemaVersion {
                supported: CURRENT_SCHEMA_VERSION,
                found,
            });
        }
        if found == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        let tx = self.conn.transaction().map_err(CoreError::persistence)?;
        tx.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_number TEXT NOT NULL,
                position_number TEXT NOT NULL,
                comment TEXT,
                comment_author TEXT,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status_updated_at TEXT NOT NULL,
                UNIQUE(request_number, position_number)
            );
            CREATE INDEX IF NOT EXISTS idx_requests_status_updated_at
                ON requests(status_updated_at);
            ",
        )
        .map_err(CoreError::persistence)?;
        Self::upgrade_legacy_table(&tx)?;
        tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
            .map_err(CoreError::persistence)?;
        tx.commit().map_err(CoreError::persistence)?;

        tracing::debug!(
            from = found,
            to = CURRENT_SCHEMA_VERSION,
            "request store schema bootstrapped"
        );
        Ok(())
    }

    /// Tables created by the first tracker generation lack `comment_author` and
    /// `created_at`, store Russian status labels and offset-less timestamps.
    fn upgrade_legacy_table(tx: &Transaction<'_>) -> Result<(), CoreError> {
        let mut stmt = tx
            .prepare("SELECT name FROM pragma_table_info('requests')")
            .map_err(CoreError::persistence)?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(CoreError::persistence)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(CoreError::persistence)?;
        drop(stmt);

        if !columns.iter().any(|column| column == "comment_author") {
            tx.execute("ALTER TABLE requests ADD COLUMN comment_author TEXT", [])
                .map_err(CoreError::persistence)?;
        }
        if !columns.iter().any(|column| column == "created_at") {
            tx.execute(
                "ALTER TABLE requests ADD COLUMN created_at TEXT NOT NULL DEFAULT ''",
                [],
            )
            .map_err(CoreError::persistence)?;
        }

        tx.execute(
            "UPDATE requests SET status_updated_at = status_updated_at || 'Z'
             WHERE status_updated_at NOT LIKE '%Z'",
            [],
        )
        .map_err(CoreError::persistence)?;
        tx.execute(
            "UPDATE requests SET created_at = status_updated_at WHERE created_at = ''",
            [],
        )
        .map_err(CoreError::persistence)?;
        for status in RequestStatus::ALL {
            tx.execute(
                "UPDATE requests SET status = ?1 WHERE status = ?2",
                params![status.as_key(), status.legacy_label()],
            )
            .map_err(CoreError::persistence)?;
        }
        Ok(())
    }

    fn map_row(row: &rusqlite::Row<'_>) -> Result<RequestRecord, rusqlite::Error> {
        Ok(RequestRecord {
            id: row.get(0)?,
            request_number: row.get(1)?,
            position_number: row.get(2)?,
            comment: row.get(3)?,
            comment_author: row.get(4)?,
            status: parse_status(&row.get::<_, String>(5)?)?,
            created_at: parse_timestamp(&row.get::<_, String>(6)?)?,
            status_updated_at: parse_timestamp(&row.get::<_, String>(7)?)?,
        })
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<RequestRecord>, CoreError> {
        let mut stmt = self.conn.prepare(sql).map_err(CoreError::persistence)?;
        let rows = stmt
            .query_map(params, Self::map_row)
            .map_err(CoreError::persistence)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(CoreError::persistence)
    }

    pub fn list_limited(&self, limit: usize) -> Result<Vec<RequestRecord>, CoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM requests
                 ORDER BY status_updated_at DESC, id DESC
                 LIMIT ?1"
            ),
            params![limit],
        )
    }

    /// Moves the last status change `minutes` into the past, dragging
    /// `created_at` along when it would otherwise lie after it.
    pub fn backdate(
        &mut self,
        request_number: &str,
        position_number: &str,
        minutes: u64,
    ) -> Result<UpdateOutcome, CoreError> {
        let tx = self.conn.transaction().map_err(CoreError::persistence)?;
        let current = tx
            .query_row(
                "SELECT created_at, status_updated_at FROM requests
                 WHERE request_number = ?1 AND position_number = ?2",
                params![request_number, position_number],
                |row| {
                    Ok((
                        parse_timestamp(&row.get::<_, String>(0)?)?,
                        parse_timestamp(&row.get::<_, String>(1)?)?,
                    ))
                },
            )
            .optional()
            .map_err(CoreError::persistence)?;

        let Some((created_at, status_updated_at)) = current else {
            return Ok(UpdateOutcome::NotFound);
        };
        if minutes == 0 {
            return Ok(UpdateOutcome::Unchanged);
        }

        let backdated = minutes_before(status_updated_at, minutes).ok_or_else(|| {
            CoreError::Validation(format!(
                "backdating {request_number}/{position_number} by {minutes} minutes leaves the storable time range"
            ))
        })?;
        let created_at = created_at.min(backdated);
        tx.execute(
            "UPDATE requests SET created_at = ?1, status_updated_at = ?2
             WHERE request_number = ?3 AND position_number = ?4",
            params![
                format_timestamp(created_at)?,
                format_timestamp(backdated)?,
                request_number,
                position_number
            ],
        )
        .map_err(CoreError::persistence)?;
        tx.commit().map_err(CoreError::persistence)?;

        tracing::info!(
            request_number,
            position_number,
            minutes,
            "request status timestamp backdated"
        );
        Ok(UpdateOutcome::Updated)
    }
}

impl RequestStore for SqliteRequestStore {
    fn add(&mut self, request: NewRequest) -> Result<i64, CoreError> {
        let request = request.normalized()?;
        let timestamp = format_timestamp(self.now())?;
        let status = RequestStatus::INITIAL;

        let inserted = self.conn.execute(
            "
            INSERT INTO requests (
                request_number, position_number, comment, comment_author, status, created_at, status_updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ",
            params![
                request.request_number,
                request.position_number,
                request.comment,
                request.comment_author,
                status.as_key(),
                timestamp,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                tracing::warn!(
                    request_number = request.request_number.as_str(),
                    position_number = request.position_number.as_str(),
                    "request already exists and cannot be duplicated"
                );
                return Err(CoreError::DuplicateRequest {
                    request_number: request.request_number,
                    position_number: request.position_number,
                });
            }
            Err(err) => return Err(CoreError::persistence(err)),
        }

        let id = self.conn.last_insert_rowid();
        tracing::info!(
            id,
            request_number = request.request_number.as_str(),
            position_number = request.position_number.as_str(),
            status = %status,
            "request created"
        );
        Ok(id)
    }

    fn list(&self) -> Result<Vec<RequestRecord>, CoreError> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM requests
                 ORDER BY status_updated_at DESC, id DESC"
            ),
            [],
        )
    }

    fn find(
        &self,
        request_number: &str,
        position_number: &str,
    ) -> Result<Option<RequestRecord>, CoreError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM requests
                     WHERE request_number = ?1 AND position_number = ?2"
                ),
                params![request_number, position_number],
                Self::map_row,
            )
            .optional()
            .map_err(CoreError::persistence)
    }

    fn update_status(
        &mut self,
        request_number: &str,
        position_number: &str,
        status: RequestStatus,
    ) -> Result<UpdateOutcome, CoreError> {
        let now = self.now();
        let tx = self.conn.transaction().map_err(CoreError::persistence)?;
        let current = tx
            .query_row(
                "SELECT status, status_updated_at FROM requests
                 WHERE request_number = ?1 AND position_number = ?2",
                params![request_number, position_number],
                |row| {
                    Ok((
                        parse_status(&row.get::<_, String>(0)?)?,
                        parse_timestamp(&row.get::<_, String>(1)?)?,
                    ))
                },
            )
            .optional()
            .map_err(CoreError::persistence)?;

        let Some((current_status, last_updated)) = current else {
            tracing::warn!(
                request_number,
                position_number,
                status = %status,
                "no request found when setting status"
            );
            return Ok(UpdateOutcome::NotFound);
        };
        if current_status == status {
            return Ok(UpdateOutcome::Unchanged);
        }

        let next = now.max(last_updated + Duration::SECOND);
        tx.execute(
            "UPDATE requests SET status = ?1, status_updated_at = ?2
             WHERE request_number = ?3 AND position_number = ?4",
            params![
                status.as_key(),
                format_timestamp(next)?,
                request_number,
                position_number
            ],
        )
        .map_err(CoreError::persistence)?;
        tx.commit().map_err(CoreError::persistence)?;

        tracing::info!(
            request_number,
            position_number,
            from = %current_status,
            to = %status,
            "request status updated"
        );
        Ok(UpdateOutcome::Updated)
    }

    fn update_comment(
        &mut self,
        request_number: &str,
        position_number: &str,
        comment: &str,
        author: Option<&str>,
    ) -> Result<UpdateOutcome, CoreError> {
        let comment = non_blank(Some(comment.to_owned()));
        let author = non_blank(author.map(ToOwned::to_owned));

        let tx = self.conn.transaction().map_err(CoreError::persistence)?;
        let current = tx
            .query_row(
                "SELECT comment, comment_author FROM requests
                 WHERE request_number = ?1 AND position_number = ?2",
                params![request_number, position_number],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()
            .map_err(CoreError::persistence)?;

        let Some((current_comment, current_author)) = current else {
            tracing::warn!(
                request_number,
                position_number,
                "no request found when saving comment"
            );
            return Ok(UpdateOutcome::NotFound);
        };
        if current_comment == comment && current_author == author {
            return Ok(UpdateOutcome::Unchanged);
        }

        tx.execute(
            "UPDATE requests SET comment = ?1, comment_author = ?2
             WHERE request_number = ?3 AND position_number = ?4",
            params![comment, author, request_number, position_number],
        )
        .map_err(CoreError::persistence)?;
        tx.commit().map_err(CoreError::persistence)?;

        tracing::info!(request_number, position_number, "request comment updated");
        Ok(UpdateOutcome::Updated)
    }

    fn delayed(&self, minutes: u64) -> Result<Vec<RequestRecord>, CoreError> {
        let Some(cutoff) = minutes_before(self.now(), minutes) else {
            tracing::debug!(minutes, "delay window reaches past the earliest storable time");
            return Ok(Vec::new());
        };
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM requests
                 WHERE status_updated_at < ?1
                 ORDER BY status_updated_at ASC, id ASC"
            ),
            params![format_timestamp(cutoff)?],
        )
    }
}

/// `None` when the result falls before year 0, which RFC 3339 text cannot hold.
fn minutes_before(from: OffsetDateTime, minutes: u64) -> Option<OffsetDateTime> {
    i64::try_from(minutes)
        .ok()
        .and_then(|minutes| minutes.checked_mul(60))
        .and_then(|seconds| from.checked_sub(Duration::seconds(seconds)))
        .filter(|shifted| shifted.year() >= 0)
}
