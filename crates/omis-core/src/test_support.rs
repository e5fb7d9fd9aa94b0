use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use time::{Duration, OffsetDateTime};

use crate::clock::Clock;

static ENV_VAR_LOCK: Mutex<()> = Mutex::new(());
static TEST_PATH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Runs `run` with each variable set (or removed for `None`) while holding
/// the process-wide environment lock. Previous values are restored afterwards.
pub fn with_env_vars<R>(vars: &[(&str, Option<&str>)], run: impl FnOnce() -> R) -> R {
    let _guard = ENV_VAR_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let previous: Vec<(&str, Option<OsString>)> = vars
        .iter()
        .map(|(key, value)| {
            let previous = std::env::var_os(key);
            match value {
                Some(value) => unsafe { std::env::set_var(key, value) },
                None => unsafe { std::env::remove_var(key) },
            }
            (*key, previous)
        })
        .collect();

    let result = run();

    for (key, value) in previous {
        match value {
            Some(value) => unsafe { std::env::set_var(key, value) },
            None => unsafe { std::env::remove_var(key) },
        }
    }
    result
}

/// Per-process unique path under the temp dir; nothing is created.
pub fn unique_test_db_path(tag: &str) -> PathBuf {
    let counter = TEST_PATH_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "omis-{tag}-{}-{counter}.sqlite3",
        std::process::id()
    ))
}

/// Temporary database file removed on drop.
pub struct TestDbPath {
    path: PathBuf,
}

impl TestDbPath {
    pub fn new(tag: &str) -> Self {
        Self {
            path: unique_test_db_path(tag),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TestDbPath {
    fn drop(&mut self) {
        for suffix in ["", "-journal", "-wal", "-shm"] {
            let mut candidate = self.path.clone().into_os_string();
            candidate.push(suffix);
            if let Err(err) = std::fs::remove_file(&candidate) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    eprintln!(
                        "warning: failed to remove temporary test database {}: {err}",
                        PathBuf::from(candidate).display()
                    );
                }
            }
        }
    }
}

/// Manually driven clock for deterministic timestamps.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<OffsetDateTime>,
}

impl FixedClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn shared(now: OffsetDateTime) -> Arc<Self> {
        Arc::new(Self::new(now))
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> MutexGuard<'_, OffsetDateTime> {
        self.now
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn with_env_vars_restores_previous_values() {
        let set_key = format!("OMIS_TEST_HELPER_SET_{}", std::process::id());
        let removed_key = format!("OMIS_TEST_HELPER_REMOVED_{}", std::process::id());
        unsafe { std::env::set_var(&removed_key, "kept") };

        with_env_vars(&[(&set_key, Some("inner")), (&removed_key, None)], || {
            assert_eq!(std::env::var(&set_key).expect("set value"), "inner");
            assert!(std::env::var(&removed_key).is_err());
        });

        assert!(std::env::var(&set_key).is_err());
        assert_eq!(std::env::var(&removed_key).expect("restored value"), "kept");
        unsafe { std::env::remove_var(&removed_key) };
    }

    #[test]
    fn unique_test_db_path_differs_between_calls() {
        let first = unique_test_db_path("helper");
        let second = unique_test_db_path("helper");

        assert_ne!(first, second);
        assert!(first.to_string_lossy().contains("omis-helper-"));
    }

    #[test]
    fn fixed_clock_only_moves_when_told() {
        let clock = FixedClock::new(datetime!(2025-09-27 10:00:00 UTC));
        assert_eq!(clock.now(), datetime!(2025-09-27 10:00:00 UTC));

        clock.advance(Duration::minutes(15));
        assert_eq!(clock.now(), datetime!(2025-09-27 10:15:00 UTC));

        clock.set(datetime!(2025-01-01 00:00:00 UTC));
        assert_eq!(clock.now(), datetime!(2025-01-01 00:00:00 UTC));
    }
}
