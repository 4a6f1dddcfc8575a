//! Read-only views of the ledger for one viewer
//!
//! Projections borrow the aggregate and are recomputed from it on demand;
//! nothing here is cached or mutated.

use crate::{
    config::DashboardConfig,
    session::Scope,
    types::{AppData, Deposit, Loan, Member, MemberId, Transaction},
};
use rust_decimal::Decimal;
use serde::Serialize;

/// Dashboard totals over the visible rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    /// Sum of `current_balance` ("total pool" for admins, "my balance" otherwise)
    pub total_balance: Decimal,
    /// Sum of outstanding principal over active loans
    pub active_loan_principal: Decimal,
    /// Active members in the fund; only shown to admins
    pub active_member_count: Option<usize>,
    /// `active_loan_principal` times the flat monthly rate
    pub estimated_monthly_interest: Decimal,
}

/// Transaction with the owning member's display name
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRow<'a> {
    /// The entry
    pub transaction: &'a Transaction,
    /// Member name, or the raw member id if the member is unknown
    pub member_name: &'a str,
}

/// Role-scoped view of the aggregate
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    data: &'a AppData,
    viewer: &'a Member,
    scope: Scope<'a>,
    config: &'a DashboardConfig,
}

impl<'a> View<'a> {
    /// View of `data` as seen by `viewer`
    pub fn new(data: &'a AppData, viewer: &'a Member, config: &'a DashboardConfig) -> Self {
        Self {
            data,
            viewer,
            scope: Scope::for_member(viewer),
            config,
        }
    }

    /// Member the view is for
    pub fn viewer(&self) -> &'a Member {
        self.viewer
    }

    /// Visible members
    pub fn members(&self) -> Vec<&'a Member> {
        self.data
            .members
            .iter()
            .filter(|m| self.scope.permits(&m.member_id))
            .collect()
    }

    /// Visible deposit rows, newest year first
    pub fn deposits(&self) -> Vec<&'a Deposit> {
        let mut deposits: Vec<_> = self
            .data
            .deposits
            .iter()
            .filter(|d| self.scope.permits(&d.member_id))
            .collect();
        deposits.sort_by(|a, b| b.year.cmp(&a.year));
        deposits
    }

    /// Visible loans, in store order
    pub fn loans(&self) -> Vec<&'a Loan> {
        self.data
            .loans
            .iter()
            .filter(|l| self.scope.permits(&l.member_id))
            .collect()
    }

    /// Visible transactions, most recent `created_at` first
    pub fn transactions(&self) -> Vec<&'a Transaction> {
        let mut transactions: Vec<_> = self
            .data
            .transactions
            .iter()
            .filter(|t| self.scope.permits(&t.member_id))
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        transactions
    }

    /// Transaction log rows with member names
    pub fn transaction_log(&self) -> Vec<TransactionRow<'a>> {
        self.transactions()
            .into_iter()
            .map(|transaction| TransactionRow {
                transaction,
                member_name: self.member_name(&transaction.member_id),
            })
            .collect()
    }

    /// The most recent transactions shown on the dashboard
    pub fn recent_transactions(&self) -> Vec<&'a Transaction> {
        let mut transactions = self.transactions();
        transactions.truncate(self.config.recent_transactions);
        transactions
    }

    /// Dashboard totals
    pub fn dashboard(&self) -> Dashboard {
        let total_balance = self.deposits().iter().map(|d| d.current_balance).sum();
        let active_loan_principal: Decimal = self
            .loans()
            .iter()
            .filter(|l| l.is_active())
            .map(|l| l.outstanding_principal)
            .sum();
        Dashboard {
            total_balance,
            active_loan_principal,
            active_member_count: self
                .viewer
                .is_admin()
                .then(|| self.data.active_member_count()),
            estimated_monthly_interest: active_loan_principal
                * self.config.estimated_interest_rate,
        }
    }

    /// Whether a visible deposit row already exists for `(member_id, year)`.
    ///
    /// Advisory for the deposit form; posting is never blocked by it.
    pub fn deposit_already_exists(&self, member_id: &MemberId, year: i32) -> bool {
        self.scope.permits(member_id) && self.data.deposit_for(member_id, year).is_some()
    }

    /// Next month's interest on one loan at the dashboard rate
    pub fn estimated_loan_interest(&self, loan: &Loan) -> Decimal {
        loan.estimated_monthly_interest(self.config.estimated_interest_rate)
    }

    fn member_name(&self, member_id: &'a MemberId) -> &'a str {
        self.data
            .member(member_id)
            .map(|m| m.name.as_str())
            .unwrap_or_else(|| member_id.as_str())
    }
}
