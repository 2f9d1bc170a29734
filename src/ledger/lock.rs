//! Advisory per-file lock
//!
//! A `<file>.lock` sibling created exclusively. Contended acquisitions
//! retry with exponential backoff; locks older than the stale threshold
//! are broken.
//!
//! Breaking renames the lock to a unique tombstone first, so two breakers
//! racing on the same stale lock cannot both delete it. A tombstone that
//! turns out to be fresh was a live lock taken after the staleness check
//! and is linked back into place.

use super::LedgerError;
use crate::config::LedgerConfig;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Retry and staleness policy
#[derive(Debug, Clone)]
pub struct LockPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub factor: f64,
    pub stale_after: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}

impl LockPolicy {
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            retries: config.lock_retries,
            min_backoff: Duration::from_millis(config.lock_min_backoff_ms),
            max_backoff: Duration::from_millis(config.lock_max_backoff_ms),
            factor: config.lock_backoff_factor,
            stale_after: Duration::from_millis(config.lock_stale_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let scaled = self.min_backoff.as_millis() as f64 * self.factor.max(1.0).powi(attempt as i32);
        let capped = scaled.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.round() as u64)
    }
}

/// Held lock; released on drop
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Lock `target`, retrying per `policy`
    pub async fn acquire(target: &Path, policy: &LockPolicy) -> Result<Self, LedgerError> {
        let path = lock_path(target);
        let mut attempt = 0;

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    // holder pid, informational only
                    let pid = format!("{}\n", std::process::id());
                    let _ = file.write_all(pid.as_bytes()).await;
                    let _ = file.flush().await;
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&path, policy.stale_after).await
                        && break_stale(&path, policy.stale_after).await?
                    {
                        tracing::warn!(lock = %path.display(), "Broke stale lock");
                        continue;
                    }
                    if attempt >= policy.retries {
                        return Err(LedgerError::LockContended {
                            path,
                            attempts: attempt + 1,
                        });
                    }
                    tokio::time::sleep(policy.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(LedgerError::Io(e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "Failed to release lock");
        }
    }
}

fn lock_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

async fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > stale_after)
}

/// Remove a lock already seen as stale; false if it was not ours to break
async fn break_stale(path: &Path, stale_after: Duration) -> std::io::Result<bool> {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}.stale", Uuid::new_v4().simple()));
    let tombstone = PathBuf::from(name);

    match fs::rename(path, &tombstone).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }

    if !is_stale(&tombstone, stale_after).await {
        if let Err(e) = fs::hard_link(&tombstone, path).await {
            tracing::warn!(lock = %path.display(), error = %e, "Could not restore live lock");
        }
        fs::remove_file(&tombstone).await?;
        return Ok(false);
    }

    fs::remove_file(&tombstone).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(retries: u32) -> LockPolicy {
        LockPolicy {
            retries,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            factor: 1.5,
            stale_after: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = LockPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(150));
        assert!(policy.backoff(2) > policy.backoff(1));
        assert_eq!(policy.backoff(20), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_lock_file_created_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("players.csv");

        let lock = FileLock::acquire(&target, &fast_policy(0)).await.unwrap();
        assert_eq!(lock.path(), dir.path().join("players.csv.lock"));
        assert!(lock.path().exists());

        let path = lock.path().to_path_buf();
        drop(lock);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_contended_lock_gives_up_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("rounds.csv");

        let _held = FileLock::acquire(&target, &fast_policy(0)).await.unwrap();
        let err = FileLock::acquire(&target, &fast_policy(2)).await.unwrap_err();
        match err {
            LedgerError::LockContended { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lock_acquired_once_released() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sessions.csv");

        let held = FileLock::acquire(&target, &fast_policy(0)).await.unwrap();
        let waiter = {
            let target = target.clone();
            tokio::spawn(async move {
                let policy = LockPolicy {
                    retries: 50,
                    ..fast_policy(0)
                };
                FileLock::acquire(&target, &policy).await.is_ok()
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("players.csv");
        std::fs::write(lock_path(&target), "12345\n").unwrap();

        let policy = LockPolicy {
            stale_after: Duration::ZERO,
            ..fast_policy(0)
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(FileLock::acquire(&target, &policy).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_refreshed_after_stale_check_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir.path().join("players.csv"));
        // another writer took the lock between our staleness check and the break
        std::fs::write(&path, "live\n").unwrap();

        let broken = break_stale(&path, Duration::from_secs(60)).await.unwrap();

        assert!(!broken);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "live\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_second_breaker_finds_nothing_to_break() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir.path().join("players.csv"));
        std::fs::write(&path, "12345\n").unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(break_stale(&path, Duration::ZERO).await.unwrap());
        assert!(!break_stale(&path, Duration::ZERO).await.unwrap());
        assert!(!path.exists());
    }
}
