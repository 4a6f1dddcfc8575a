//! Read-only inspection of a fund ledger store
//!
//! Usage: `fund-ledger-inspect [config.toml]`. Without a path the
//! configuration comes from `FUND_LEDGER_*` environment variables.

use anyhow::Context as _;
use fund_ledger::{Config, Ledger, Role};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => Config::from_env().context("invalid FUND_LEDGER_* environment")?,
    };

    tracing::info!(path = ?config.store_path(), "Inspecting fund ledger");
    let mut ledger = Ledger::open(config)?;

    let drift = ledger.audit()?;
    tracing::info!(drifted_rows = drift.len(), "Invariants hold");

    let Some(admin_mobile) = ledger
        .data()
        .members
        .iter()
        .find(|m| m.role == Role::Admin && m.is_active())
        .map(|m| m.mobile.clone())
    else {
        tracing::warn!("No active admin member, skipping dashboard");
        return Ok(());
    };
    ledger.login(&admin_mobile)?;

    let view = ledger.view()?;
    let dashboard = view.dashboard();
    tracing::info!(
        total_balance = %dashboard.total_balance,
        active_loan_principal = %dashboard.active_loan_principal,
        active_members = ?dashboard.active_member_count,
        estimated_monthly_interest = %dashboard.estimated_monthly_interest,
        "Dashboard"
    );
    println!("{}", serde_json::to_string_pretty(&dashboard)?);
    let recent = ledger.config().dashboard.recent_transactions;
    for row in view.transaction_log().into_iter().take(recent) {
        println!(
            "{}  {:<10}  {:>14}  {}  {}",
            row.transaction.transaction_month,
            row.transaction.transaction_type,
            row.transaction.amount,
            row.member_name,
            row.transaction.notes
        );
    }

    Ok(())
}
