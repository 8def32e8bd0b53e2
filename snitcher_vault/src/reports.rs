//! Snitcher Vault - Reports
//!
//! Saving a report: sanitize the text, seal it to `<reports_dir>/<uuid>.txt`,
//! bump the session counter and build the submission payload. Sending the
//! payload is left to the caller.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SnitcherConfig;
use crate::error::{VaultError, VaultResult};
use crate::sealer::ReportSealer;
use crate::secure_fs::purge_dir;

/// Report categories offered to the user
pub const REPORT_CATEGORIES: &[&str] = &[
    "Home Owner/Licensing",
    "Lost Pet",
    "Feral Cat",
    "Sick or Injured Animal",
    "Exotic Wildlife Trade",
    "Trophy Hunting",
    "Dog Fighting Ring",
    "Illegal Puppy Mill",
    "Improper Conditions",
    "Other - Cruelty",
];

/// Strip characters that could break out of the submission encoding
pub fn sanitize_report(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\\' | ';' | '%' | '"' | '\''))
        .collect()
}

/// Form payload for the report endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportSubmission {
    pub application_id: u64,
    pub report_id: String,
    pub report: String,
    pub category: String,
    pub endpoint: String,
}

/// Result of a saved report
#[derive(Debug, Clone)]
pub struct ReportReceipt {
    pub report_id: Uuid,
    pub path: PathBuf,
    /// Reports saved this session, including this one
    pub session_count: u64,
    pub submission: ReportSubmission,
}

/// Reports saved during this session
#[derive(Debug, Default)]
pub struct ReportTracker {
    count: Mutex<u64>,
}

impl ReportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one submission and return the count it produced
    pub fn record_submission(&self) -> u64 {
        let mut count = self.count.lock();
        *count += 1;
        *count
    }

    pub fn count(&self) -> u64 {
        *self.count.lock()
    }
}

/// Clears the in-progress flag when a submission ends, however it ends
struct SendingGuard<'a>(&'a AtomicBool);

impl<'a> SendingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> VaultResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| VaultError::SubmissionInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ReportService {
    sealer: ReportSealer,
    tracker: ReportTracker,
    reports_dir: PathBuf,
    application_id: u64,
    endpoint: String,
    sending: AtomicBool,
}

impl ReportService {
    pub fn new(sealer: ReportSealer, config: &SnitcherConfig) -> VaultResult<Self> {
        Ok(Self {
            sealer,
            tracker: ReportTracker::new(),
            reports_dir: config.reports_dir(),
            application_id: config.report_application_id()?,
            endpoint: config.report_endpoint.clone(),
            sending: AtomicBool::new(false),
        })
    }

    pub fn tracker(&self) -> &ReportTracker {
        &self.tracker
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Seal a report. Only one submission runs at a time.
    pub fn submit(&self, category: &str, text: &str) -> VaultResult<ReportReceipt> {
        let _guard = SendingGuard::acquire(&self.sending)?;

        let report = sanitize_report(text);
        let report_id = Uuid::new_v4();

        std::fs::create_dir_all(&self.reports_dir)?;
        let sealed = self.sealer.seal(self.report_path(&report_id))?;
        sealed.write_with(|w| Ok(w.write_all(report.as_bytes())?))?;

        let session_count = self.tracker.record_submission();
        log::info!("Report {} saved (session count {})", report_id, session_count);

        Ok(ReportReceipt {
            report_id,
            path: sealed.path().to_path_buf(),
            session_count,
            submission: ReportSubmission {
                application_id: self.application_id,
                report_id: report_id.to_string(),
                report,
                category: category.to_string(),
                endpoint: self.endpoint.clone(),
            },
        })
    }

    /// [`Self::submit`] on a blocking worker
    pub async fn submit_async(
        self: Arc<Self>,
        category: String,
        text: String,
    ) -> VaultResult<ReportReceipt> {
        tokio::task::spawn_blocking(move || self.submit(&category, &text))
            .await
            .map_err(|e| VaultError::Worker(e.to_string()))?
    }

    /// Decrypt a saved report
    pub fn read_report(&self, id: &str) -> VaultResult<String> {
        let report_id =
            Uuid::parse_str(id).map_err(|_| VaultError::ReportNotFound(id.to_string()))?;

        let path = self.report_path(&report_id);
        if !path.exists() {
            return Err(VaultError::ReportNotFound(id.to_string()));
        }

        let plaintext = self.sealer.seal(path)?.read_to_vec()?;
        String::from_utf8(plaintext).map_err(|e| VaultError::DeserializationError(e.to_string()))
    }

    fn report_path(&self, id: &Uuid) -> PathBuf {
        self.reports_dir.join(format!("{}.txt", id))
    }
}

/// Drop everything in the cache directory. Returns files removed.
pub fn purge_cache(cache_dir: &Path) -> VaultResult<usize> {
    let removed = purge_dir(cache_dir)?;
    log::debug!("Cache purged ({} files)", removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;
    use snitcher_keystore::SoftwareKeyStore;
    use std::collections::HashSet;
    use std::thread;
    use tempfile::{tempdir, TempDir};

    fn service() -> (ReportService, TempDir) {
        let dir = tempdir().unwrap();
        let config = SnitcherConfig::with_data_dir(dir.path());
        (ReportService::new(sealer(), &config).unwrap(), dir)
    }

    fn sealer() -> ReportSealer {
        ReportSealer::new(
            Arc::new(SoftwareKeyStore::in_memory()),
            Arc::new(MemorySettings::new()),
        )
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(
            sanitize_report(r#"Dog's "kennel"; 100% \locked\"#),
            "Dogs kennel 100 locked"
        );
        assert_eq!(sanitize_report("plain text"), "plain text");
    }

    #[test]
    fn test_categories() {
        assert_eq!(REPORT_CATEGORIES.len(), 10);
        assert_eq!(REPORT_CATEGORIES[0], "Home Owner/Licensing");
        assert_eq!(REPORT_CATEGORIES[9], "Other - Cruelty");
    }

    #[test]
    fn test_submit_and_read_back() {
        let (service, _dir) = service();

        let receipt = service.submit("Lost Pet", "Brown dog; near the 'park'").unwrap();
        assert_eq!(receipt.session_count, 1);
        assert_eq!(receipt.submission.report, "Brown dog near the park");
        assert_eq!(receipt.submission.application_id, 46341 * 46341);
        assert_eq!(receipt.submission.category, "Lost Pet");
        assert_eq!(
            receipt.path.file_name().unwrap().to_str().unwrap(),
            format!("{}.txt", receipt.report_id)
        );

        // Nothing readable at rest
        let raw = std::fs::read(&receipt.path).unwrap();
        assert!(!raw.windows(9).any(|w| w == b"Brown dog".as_slice()));

        let text = service.read_report(&receipt.report_id.to_string()).unwrap();
        assert_eq!(text, "Brown dog near the park");
    }

    #[test]
    fn test_each_report_gets_own_file() {
        let (service, _dir) = service();

        let a = service.submit("Feral Cat", "same").unwrap();
        let b = service.submit("Feral Cat", "same").unwrap();

        assert_ne!(a.report_id, b.report_id);
        assert_ne!(a.path, b.path);
        assert_eq!(b.session_count, 2);
        assert_eq!(service.tracker().count(), 2);
    }

    #[test]
    fn test_submission_in_progress() {
        let (service, _dir) = service();

        service.sending.store(true, Ordering::SeqCst);
        assert!(matches!(
            service.submit("Lost Pet", "x"),
            Err(VaultError::SubmissionInProgress)
        ));
        assert_eq!(service.tracker().count(), 0);

        service.sending.store(false, Ordering::SeqCst);
        assert!(service.submit("Lost Pet", "x").is_ok());
        assert!(!service.sending.load(Ordering::SeqCst));
    }

    #[test]
    fn test_application_id_overflow_is_an_error() {
        let dir = tempdir().unwrap();
        let config = SnitcherConfig {
            application_id: 4_294_967_296,
            provider_id: 4_294_967_296,
            ..SnitcherConfig::with_data_dir(dir.path())
        };

        assert!(matches!(
            ReportService::new(sealer(), &config),
            Err(VaultError::Config(_))
        ));
    }

    #[test]
    fn test_read_report_unknown() {
        let (service, _dir) = service();

        assert!(matches!(
            service.read_report(&Uuid::new_v4().to_string()),
            Err(VaultError::ReportNotFound(_))
        ));
        assert!(matches!(
            service.read_report("../users.dat"),
            Err(VaultError::ReportNotFound(_))
        ));
    }

    #[test]
    fn test_tracker_has_no_lost_updates() {
        let tracker = Arc::new(ReportTracker::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                thread::spawn(move || (0..250).map(|_| tracker.record_submission()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(seen.insert(value), "count {} reported twice", value);
            }
        }

        assert_eq!(tracker.count(), 2000);
        assert_eq!(seen.len(), 2000);
    }

    #[tokio::test]
    async fn test_submit_async() {
        let (service, _dir) = service();
        let service = Arc::new(service);

        let receipt = service
            .clone()
            .submit_async("Trophy Hunting".into(), "seen at dawn".into())
            .await
            .unwrap();

        assert_eq!(receipt.session_count, 1);
        assert_eq!(
            service.read_report(&receipt.report_id.to_string()).unwrap(),
            "seen at dawn"
        );
    }

    #[test]
    fn test_purge_cache() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join("temp.jpg"), b"x").unwrap();

        assert_eq!(purge_cache(&cache).unwrap(), 1);
        assert!(cache.exists());
    }
}
