//! `Sealbook`: one storage handle shared by every component, with the
//! configured actor attached to everything sealed through it.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use sealbook_audit::{AuditEvent, ChainHead, ChainReport, Ledger, VerifyScope};
use sealbook_backup::{BackupEngine, RestoreSummary};
use sealbook_contracts::{
    backup::{BackupArtifact, BackupTable},
    error::SealResult,
    journal::{EntryVerification, JournalDraft, JournalEntry},
    money::Cents,
    tax::{TaxComputation, TaxPeriod, TaxReport, TaxTransaction, TaxTransactionDraft},
};
use sealbook_core::Store;
use sealbook_journal::{Amendment, Journal};
use sealbook_tax::TaxEngine;

use crate::config::SealbookConfig;

pub struct Sealbook {
    config: SealbookConfig,
    store: Arc<Store>,
    ledger: Ledger,
    journal: Journal,
    tax: TaxEngine,
    backup: BackupEngine,
}

impl Sealbook {
    /// Open the database named by `config` and seed its jurisdictions.
    pub fn open(config: SealbookConfig) -> SealResult<Self> {
        let store = Store::open(&config.database_path)?;
        Self::assemble(config, store)
    }

    /// A throwaway in-memory book, e.g. for previews and tests.
    pub fn in_memory(config: SealbookConfig) -> SealResult<Self> {
        Self::assemble(config, Store::in_memory()?)
    }

    fn assemble(config: SealbookConfig, store: Store) -> SealResult<Self> {
        let config = config.validated()?;
        let store = Arc::new(store);
        let book = Self {
            ledger: Ledger::new(store.clone()),
            journal: Journal::new(store.clone()),
            tax: TaxEngine::new(store.clone()),
            backup: BackupEngine::with_settings(store.clone(), config.backup.settings()),
            store,
            config,
        };

        if !book.config.jurisdictions.is_empty() {
            let seeded = book.tax.seed(&book.config.jurisdictions)?;
            info!(seeded, "jurisdictions loaded from config");
        }
        Ok(book)
    }

    pub fn config(&self) -> &SealbookConfig {
        &self.config
    }

    pub fn actor_id(&self) -> &str {
        &self.config.actor_id
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn tax(&self) -> &TaxEngine {
        &self.tax
    }

    // ── Journal ───────────────────────────────────────────────────────────────

    pub fn post_journal_entry(&self, draft: &JournalDraft) -> SealResult<JournalEntry> {
        self.journal.post(draft, self.actor_id())
    }

    pub fn reverse_journal_entry(&self, entry_number: &str) -> SealResult<JournalEntry> {
        self.journal.reverse(entry_number, self.actor_id())
    }

    pub fn verify_journal_entry(&self, entry_number: &str) -> SealResult<EntryVerification> {
        self.journal.verify_entry(entry_number)
    }

    pub fn journal_entry(&self, entry_number: &str) -> SealResult<JournalEntry> {
        self.journal.get(entry_number)
    }

    /// Always fails with `AppendOnly`; the attempt is sealed.
    pub fn amend_journal_entry(&self, entry_number: &str, amendment: &Amendment) -> SealResult<()> {
        self.journal
            .attempt_amend(entry_number, amendment, self.actor_id())
    }

    // ── Tax ───────────────────────────────────────────────────────────────────

    pub fn compute_tax(
        &self,
        amount: Cents,
        jurisdiction_code: &str,
        as_of_date: NaiveDate,
    ) -> SealResult<TaxComputation> {
        self.tax.compute(amount, jurisdiction_code, as_of_date)
    }

    pub fn record_tax_transaction(&self, draft: &TaxTransactionDraft) -> SealResult<TaxTransaction> {
        self.tax.record(draft, self.actor_id())
    }

    pub fn generate_period_tax_report(&self, period: &TaxPeriod) -> SealResult<TaxReport> {
        self.tax.generate_period_report(period)
    }

    /// Returns the id of the `report-generated` event.
    pub fn persist_period_tax_report(&self, report: &TaxReport) -> SealResult<i64> {
        self.tax.persist_report(report, self.actor_id())
    }

    // ── Backup ────────────────────────────────────────────────────────────────

    pub fn create_backup(
        &self,
        password: Option<&str>,
        selection: &[BackupTable],
    ) -> SealResult<BackupArtifact> {
        self.backup
            .create_backup(password, selection, self.actor_id())
    }

    /// Write a backup to `path`; the `backup-created` event is sealed only
    /// once the file exists.
    pub fn export_backup(
        &self,
        password: Option<&str>,
        selection: &[BackupTable],
        path: &Path,
    ) -> SealResult<BackupArtifact> {
        self.backup
            .export_backup(password, selection, path, self.actor_id())
    }

    pub fn restore_backup(
        &self,
        artifact: &BackupArtifact,
        password: Option<&str>,
    ) -> SealResult<RestoreSummary> {
        self.backup
            .restore_backup(artifact, password, self.actor_id())
    }

    // ── Ledger ────────────────────────────────────────────────────────────────

    /// Verify `scope` and seal the outcome as a `verification-run` event.
    pub fn verify_ledger(&self, scope: &VerifyScope) -> SealResult<ChainReport> {
        self.ledger.audit(scope, self.actor_id())
    }

    pub fn ledger_head(&self) -> SealResult<ChainHead> {
        self.ledger.head()
    }

    pub fn ledger_events(&self) -> SealResult<Vec<AuditEvent>> {
        self.ledger.events()
    }
}
