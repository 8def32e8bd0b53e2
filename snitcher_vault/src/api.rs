//! Snitcher Vault - Unified Public API
//!
//! Single entry point wiring the key store, settings, credential vault,
//! login flow, report service and attachment check together.

use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use snitcher_keystore::{KeyStore, SoftwareKeyStore};

use crate::biometrics::BiometricAuthenticator;
use crate::config::SnitcherConfig;
use crate::error::VaultResult;
use crate::jpeg;
use crate::login::{LoginOutcome, LoginService};
use crate::reports::{self, ReportReceipt, ReportService, REPORT_CATEGORIES};
use crate::sealer::ReportSealer;
use crate::settings::{self, FileSettings, SettingsStore};
use crate::users::UserStore;
use crate::vault::{CredentialVault, VaultState};

/// Snitcher core
///
/// # Example
///
/// ```rust,ignore
/// use snitcher_vault::{FixedAuthenticator, Snitcher, SnitcherConfig};
///
/// let app = Snitcher::open(SnitcherConfig::with_data_dir("/data/snitcher"))?;
///
/// // Sign up (first run) or log in
/// app.login("me@example.com", &FixedAuthenticator::succeeding())?;
///
/// // Seal a report
/// let receipt = app.submit_report("Lost Pet", "Brown dog near the park")?;
/// println!("Thank you for your report. Report: {}", receipt.session_count);
/// ```
pub struct Snitcher {
    config: SnitcherConfig,
    keystore: Arc<dyn KeyStore>,
    settings: Arc<dyn SettingsStore>,
    vault: Arc<CredentialVault>,
    login: LoginService,
    reports: Arc<ReportService>,
}

impl Snitcher {
    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Open with file-backed stores under `config.data_dir`
    pub fn open(config: SnitcherConfig) -> VaultResult<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        let keystore: Arc<dyn KeyStore> = Arc::new(SoftwareKeyStore::open(config.keystore_path())?);
        let settings: Arc<dyn SettingsStore> = Arc::new(FileSettings::open(config.settings_path())?);

        log::info!("Snitcher opened at {}", config.data_dir.display());
        Self::with_stores(config, keystore, settings)
    }

    /// Open over caller-provided stores
    pub fn with_stores(
        config: SnitcherConfig,
        keystore: Arc<dyn KeyStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> VaultResult<Self> {
        config.validate()?;

        let vault = Arc::new(CredentialVault::new(
            keystore.clone(),
            settings.clone(),
            config.auth_validity_seconds,
        ));
        let login = LoginService::new(
            vault.clone(),
            UserStore::new(&config.data_dir),
            settings.clone(),
        );
        let sealer = ReportSealer::new(keystore.clone(), settings.clone());
        let reports = Arc::new(ReportService::new(sealer, &config)?);

        Ok(Self {
            config,
            keystore,
            settings,
            vault,
            login,
            reports,
        })
    }

    pub fn config(&self) -> &SnitcherConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LOGIN
    // ═══════════════════════════════════════════════════════════════════════

    pub fn is_signed_up(&self) -> bool {
        self.login.is_signed_up()
    }

    /// Prompt through `authenticator`, then sign up or log in
    pub fn login(
        &self,
        email: &str,
        authenticator: &dyn BiometricAuthenticator,
    ) -> VaultResult<LoginOutcome> {
        self.login.login(email, authenticator)
    }

    /// The platform prompt reported success
    pub fn on_authenticated(&self) {
        self.keystore.record_user_authentication();
    }

    /// Sign up or log in after [`Self::on_authenticated`]
    pub fn complete_login(&self, email: &str) -> VaultResult<LoginOutcome> {
        self.login.complete_login(email)
    }

    pub fn vault_state(&self) -> VaultState {
        self.vault.state()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REPORTS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn categories(&self) -> &'static [&'static str] {
        REPORT_CATEGORIES
    }

    pub fn submit_report(&self, category: &str, text: &str) -> VaultResult<ReportReceipt> {
        self.reports.submit(category, text)
    }

    pub async fn submit_report_async(
        &self,
        category: String,
        text: String,
    ) -> VaultResult<ReportReceipt> {
        self.reports.clone().submit_async(category, text).await
    }

    pub fn read_report(&self, id: &str) -> VaultResult<String> {
        self.reports.read_report(id)
    }

    /// Reports saved this session
    pub fn report_count(&self) -> u64 {
        self.reports.tracker().count()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ATTACHMENTS & CACHE
    // ═══════════════════════════════════════════════════════════════════════

    /// JPEG signature check using the cache directory as scratch space
    pub fn validate_image<R: Read>(&self, source: &mut R) -> VaultResult<bool> {
        jpeg::is_well_formed_jpeg(source, &self.config.cache_dir)
    }

    pub fn purge_cache(&self) -> VaultResult<usize> {
        reports::purge_cache(&self.config.cache_dir)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STATUS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn status(&self) -> VaultResult<SnitcherStatus> {
        let (key_provisioned, authorized_seconds) = match self.vault.state() {
            VaultState::NoKey => (false, None),
            VaultState::Locked => (true, None),
            VaultState::Unlocked { remaining } => (true, Some(remaining.num_seconds())),
        };

        Ok(SnitcherStatus {
            signed_up: self.is_signed_up(),
            key_provisioned,
            authorized_seconds,
            last_login: settings::last_logged_in(self.settings.as_ref())?,
            session_reports: self.report_count(),
        })
    }
}

/// Snapshot for status displays
#[derive(Debug, Clone, Serialize)]
pub struct SnitcherStatus {
    pub signed_up: bool,
    pub key_provisioned: bool,
    /// Seconds left in the authorization window, if open
    pub authorized_seconds: Option<i64>,
    pub last_login: Option<DateTime<Utc>>,
    pub session_reports: u64,
}
