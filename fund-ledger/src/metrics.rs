//! Metrics collection for observability
//!
//! Each [`Metrics`] owns its own Prometheus registry, so several ledgers can
//! live in one process.
//!
//! # Metrics
//!
//! - `fund_ledger_transactions_posted_total{type}` - Transactions appended
//! - `fund_ledger_transactions_deleted_total` - Transactions deleted with reversal
//! - `fund_ledger_diagnostics_total{kind}` - Skipped side effects
//! - `fund_ledger_persist_failures_total` - Failed store writes
//! - `fund_ledger_members` - Members in the store

use crate::{engine::Diagnostic, types::TransactionType};
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::fmt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transactions appended, by type
    pub transactions_posted: IntCounterVec,

    /// Transactions deleted
    pub transactions_deleted: IntCounter,

    /// Diagnostics reported, by kind
    pub diagnostics: IntCounterVec,

    /// Failed store writes
    pub persist_failures: IntCounter,

    /// Member count
    pub members: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_posted = IntCounterVec::new(
            Opts::new(
                "fund_ledger_transactions_posted_total",
                "Total number of transactions appended",
            ),
            &["type"],
        )?;
        registry.register(Box::new(transactions_posted.clone()))?;

        let transactions_deleted = IntCounter::new(
            "fund_ledger_transactions_deleted_total",
            "Total number of transactions deleted",
        )?;
        registry.register(Box::new(transactions_deleted.clone()))?;

        let diagnostics = IntCounterVec::new(
            Opts::new(
                "fund_ledger_diagnostics_total",
                "Side effects skipped during postings and reversals",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(diagnostics.clone()))?;

        let persist_failures = IntCounter::new(
            "fund_ledger_persist_failures_total",
            "Total number of failed store writes",
        )?;
        registry.register(Box::new(persist_failures.clone()))?;

        let members = IntGauge::new("fund_ledger_members", "Members in the store")?;
        registry.register(Box::new(members.clone()))?;

        Ok(Self {
            transactions_posted,
            transactions_deleted,
            diagnostics,
            persist_failures,
            members,
            registry,
        })
    }

    /// Record transaction append
    pub fn record_posted(&self, transaction_type: TransactionType) {
        self.transactions_posted
            .with_label_values(&[transaction_type.as_str()])
            .inc();
    }

    /// Record transaction deletion
    pub fn record_deleted(&self) {
        self.transactions_deleted.inc();
    }

    /// Record skipped side effects
    pub fn record_diagnostics(&self, diagnostics: &[Diagnostic]) {
        for diagnostic in diagnostics {
            self.diagnostics
                .with_label_values(&[diagnostic.kind()])
                .inc();
        }
    }

    /// Record failed store write
    pub fn record_persist_failure(&self) {
        self.persist_failures.inc();
    }

    /// Update member count
    pub fn update_members(&self, count: usize) {
        self.members.set(count as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("transactions_deleted", &self.transactions_deleted.get())
            .field("persist_failures", &self.persist_failures.get())
            .field("members", &self.members.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemberId;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transactions_deleted.get(), 0);
        assert_eq!(metrics.persist_failures.get(), 0);
        // Independent registries never collide.
        Metrics::new().unwrap();
    }

    #[test]
    fn test_record_posted() {
        let metrics = Metrics::new().unwrap();
        metrics.record_posted(TransactionType::Deposit);
        metrics.record_posted(TransactionType::Deposit);
        metrics.record_posted(TransactionType::Loan);
        assert_eq!(
            metrics
                .transactions_posted
                .with_label_values(&["deposit"])
                .get(),
            2
        );
        assert_eq!(
            metrics.transactions_posted.with_label_values(&["loan"]).get(),
            1
        );
    }

    #[test]
    fn test_record_diagnostics() {
        let metrics = Metrics::new().unwrap();
        metrics.record_diagnostics(&[Diagnostic::NoActiveLoan {
            member_id: MemberId::new("M001"),
        }]);
        assert_eq!(
            metrics
                .diagnostics
                .with_label_values(&["no_active_loan"])
                .get(),
            1
        );
    }

    #[test]
    fn test_update_members() {
        let metrics = Metrics::new().unwrap();
        metrics.update_members(4);
        assert_eq!(metrics.members.get(), 4);
        assert!(!metrics.registry().gather().is_empty());
    }
}
