use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How often a blocking wait re-checks its condition, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    /// `None` waits until the condition holds or the run is cancelled.
    pub max_wait: Option<Duration>,
    /// Consecutive transient check failures tolerated before giving up.
    pub max_retries: u32,
}

impl WaitPolicy {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            max_wait: None,
            max_retries: 0,
        }
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_deadline(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub(crate) fn deadline_from(&self, start: Instant) -> Option<Instant> {
        self.max_wait.map(|w| start + w)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut(Duration),
    Cancelled,
}

/// Sleep for one interval unless `cancel` fires first. Returns `false` on
/// cancellation.
pub(crate) async fn pause(interval: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

pub async fn file_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

/// A regular file with at least one byte in it.
pub async fn file_has_content(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Block until `path` exists as a regular file.
pub async fn wait_for_file(
    path: &Path,
    policy: &WaitPolicy,
    cancel: &CancellationToken,
) -> WaitOutcome {
    let start = Instant::now();
    let deadline = policy.deadline_from(start);
    let mut checks = 0u64;

    loop {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        checks += 1;
        if file_exists(path).await {
            tracing::debug!(path = %path.display(), checks, "reference file present");
            return WaitOutcome::Ready;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return WaitOutcome::TimedOut(start.elapsed());
            }
        }
        tracing::debug!(path = %path.display(), checks, "reference file not present yet");

        if !pause(policy.interval, cancel).await {
            return WaitOutcome::Cancelled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn returns_immediately_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        std::fs::write(&path, b"x").unwrap();

        let policy = WaitPolicy::every(Duration::from_secs(3));
        let outcome = wait_for_file(&path, &policy, &CancellationToken::new()).await;
        assert_eq!(outcome, WaitOutcome::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn unblocks_once_file_appears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");

        let writer_path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            std::fs::write(&writer_path, b"x").unwrap();
        });

        let start = Instant::now();
        let policy = WaitPolicy::every(Duration::from_secs(3));
        let outcome = wait_for_file(&path, &policy, &CancellationToken::new()).await;
        assert_eq!(outcome, WaitOutcome::Ready);
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() <= Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn directory_does_not_count_as_file() {
        let dir = tempfile::tempdir().unwrap();
        let policy = WaitPolicy::every(Duration::from_secs(1)).with_deadline(Some(Duration::from_secs(2)));
        let outcome = wait_for_file(dir.path(), &policy, &CancellationToken::new()).await;
        assert!(matches!(outcome, WaitOutcome::TimedOut(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_the_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.png");
        let policy = WaitPolicy::every(Duration::from_secs(3)).with_deadline(Some(Duration::from_secs(10)));

        match wait_for_file(&path, &policy, &CancellationToken::new()).await {
            WaitOutcome::TimedOut(waited) => assert!(waited >= Duration::from_secs(10)),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_file_has_no_content() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.mp4");
        let full = dir.path().join("full.mp4");
        std::fs::write(&empty, b"").unwrap();
        std::fs::write(&full, b"mp4").unwrap();

        assert!(file_exists(&empty).await);
        assert!(!file_has_content(&empty).await);
        assert!(file_has_content(&full).await);
        assert!(!file_has_content(dir.path()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_wait() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.png");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let policy = WaitPolicy::every(Duration::from_secs(3));
        assert_eq!(wait_for_file(&path, &policy, &cancel).await, WaitOutcome::Cancelled);
    }
}
