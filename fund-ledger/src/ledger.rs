//! Main ledger orchestration layer
//!
//! [`Ledger`] owns the aggregate, the session and the store. Each mutation:
//!
//! 1. reasserts the session and checks the admin role
//! 2. computes a complete new aggregate through [`crate::engine`]
//! 3. swaps it in, then persists it (fire-and-forget)
//!
//! # Example
//!
//! ```no_run
//! use fund_ledger::{Config, Ledger};
//!
//! fn main() -> fund_ledger::Result<()> {
//!     let mut ledger = Ledger::open(Config::default())?;
//!     ledger.login("9876543210")?;
//!
//!     let dashboard = ledger.view()?.dashboard();
//!     println!("pool: {}", dashboard.total_balance);
//!
//!     ledger.logout();
//!     Ok(())
//! }
//! ```

use crate::{
    engine::{
        self, Context, DepositRequest, Diagnostic, LoanEventRequest, MemberPatch, NewMember,
        Transition,
    },
    metrics::Metrics,
    projection::View,
    session::{self, Session},
    storage::{self, FileStorage, Storage},
    types::{AppData, BalanceDrift, Loan, LoanId, Member, MemberId, MemberStatus, Transaction,
        TransactionId},
    Config, Error, Result,
};
use chrono::Utc;

/// Result of a committed mutation
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    /// Operation output
    pub value: T,
    /// Side effects that were skipped
    pub diagnostics: Vec<Diagnostic>,
}

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger<S: Storage = FileStorage> {
    /// Current aggregate; replaced wholesale on every mutation
    data: AppData,

    /// Logged-in member, if any
    session: Option<Session>,

    /// Persisted store
    storage: S,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger<FileStorage> {
    /// Open the file-backed ledger described by `config`
    pub fn open(config: Config) -> Result<Self> {
        let storage = FileStorage::open(&config)?;
        Self::with_storage(config, storage)
    }
}

impl<S: Storage> Ledger<S> {
    /// Open a ledger on an explicit store
    pub fn with_storage(config: Config, storage: S) -> Result<Self> {
        let data = storage::load_or_seed(&storage)?;
        let metrics = Metrics::new()?;
        metrics.update_members(data.members.len());

        tracing::info!(
            service = %config.service_name,
            policy = ?config.reversal_policy,
            "Ledger opened"
        );

        Ok(Self {
            data,
            session: None,
            storage,
            metrics,
            config,
        })
    }

    /// Current aggregate
    pub fn data(&self) -> &AppData {
        &self.data
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Held session
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Log in by mobile number and hold the session
    pub fn login(&mut self, mobile: &str) -> Result<Member> {
        let member = match session::authenticate(&self.data, mobile) {
            Ok(member) => member.clone(),
            Err(e) => {
                tracing::info!(error = %e, "Login rejected");
                return Err(e);
            }
        };
        tracing::info!(member_id = %member.member_id, role = ?member.role, "Logged in");
        self.session = Some(Session::new(&member));
        Ok(member)
    }

    /// Drop the held session
    pub fn logout(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(member_id = %session.member_id(), "Logged out");
        }
    }

    /// Member behind the held session, re-read from the store
    pub fn current_member(&self) -> Result<&Member> {
        self.session
            .as_ref()
            .ok_or(Error::Unauthenticated)?
            .resolve(&self.data)
    }

    /// Role-scoped view for the logged-in member
    pub fn view(&self) -> Result<View<'_>> {
        let member = self.current_member()?;
        Ok(View::new(&self.data, member, &self.config.dashboard))
    }

    /// Post a membership deposit
    pub fn post_deposit(&mut self, req: DepositRequest) -> Result<Transaction> {
        let ctx = self.admin_context()?;
        let transition = engine::post_deposit(&self.data, &ctx, &req)?;
        let outcome = self.commit(transition);

        tracing::info!(
            transaction_id = %outcome.value.transaction_id,
            member_id = %req.member_id,
            year = req.year,
            amount = %req.amount,
            "Deposit posted"
        );
        self.metrics.record_posted(outcome.value.transaction_type);
        Ok(outcome.value)
    }

    /// Post a disbursement, repayment or interest payment
    pub fn post_loan_event(&mut self, req: LoanEventRequest) -> Result<Outcome<Transaction>> {
        let ctx = self.admin_context()?;
        let transition = engine::post_loan_event(&self.data, &ctx, &req)?;
        let outcome = self.commit(transition);

        tracing::info!(
            transaction_id = %outcome.value.transaction_id,
            member_id = %req.member_id,
            purpose = ?req.purpose,
            amount = %outcome.value.amount,
            "Loan event posted"
        );
        self.metrics.record_posted(outcome.value.transaction_type);
        Ok(outcome)
    }

    /// Delete a transaction and reverse its effect.
    ///
    /// Confirmation is the caller's job. `Ok(None)` if the id is unknown.
    pub fn delete_transaction(
        &mut self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Outcome<Transaction>>> {
        let ctx = self.admin_context()?;
        let Some(transition) = engine::delete_transaction(&self.data, &ctx, transaction_id)?
        else {
            tracing::debug!(transaction_id = %transaction_id, "Delete of unknown transaction ignored");
            return Ok(None);
        };
        let outcome = self.commit(transition);

        tracing::info!(
            transaction_id = %transaction_id,
            member_id = %outcome.value.member_id,
            transaction_type = %outcome.value.transaction_type,
            amount = %outcome.value.amount,
            "Transaction deleted"
        );
        self.metrics.record_deleted();
        Ok(Some(outcome))
    }

    /// Add a member (with a zero-balance deposit row for this year)
    pub fn create_member(&mut self, new_member: NewMember) -> Result<Member> {
        let ctx = self.admin_context()?;
        let transition = engine::create_member(&self.data, &ctx, &new_member)?;
        let member = self.commit(transition).value;

        tracing::info!(member_id = %member.member_id, role = ?member.role, "Member created");
        Ok(member)
    }

    /// Update the supplied member fields. `Ok(None)` if the id is unknown.
    pub fn edit_member(
        &mut self,
        member_id: &MemberId,
        patch: MemberPatch,
    ) -> Result<Option<Member>> {
        self.admin_context()?;
        let Some(transition) = engine::edit_member(&self.data, member_id, &patch)? else {
            tracing::debug!(member_id = %member_id, "Edit of unknown member ignored");
            return Ok(None);
        };
        let member = self.commit(transition).value;

        tracing::info!(member_id = %member_id, "Member updated");
        Ok(Some(member))
    }

    /// Enable or disable a member. `Ok(None)` if the id is unknown.
    pub fn toggle_member_status(&mut self, member_id: &MemberId) -> Result<Option<MemberStatus>> {
        self.admin_context()?;
        let Some(transition) = engine::toggle_member_status(&self.data, member_id) else {
            tracing::debug!(member_id = %member_id, "Toggle of unknown member ignored");
            return Ok(None);
        };
        let status = self.commit(transition).value;

        tracing::info!(member_id = %member_id, status = ?status, "Member status changed");
        Ok(Some(status))
    }

    /// Close a fully repaid loan. `Ok(None)` if unknown or already closed.
    pub fn close_loan(&mut self, loan_id: &LoanId) -> Result<Option<Loan>> {
        self.admin_context()?;
        let Some(transition) = engine::close_loan(&self.data, loan_id)? else {
            tracing::debug!(loan_id = %loan_id, "Close of unknown or closed loan ignored");
            return Ok(None);
        };
        let loan = self.commit(transition).value;

        tracing::info!(loan_id = %loan_id, member_id = %loan.member_id, "Loan closed");
        Ok(Some(loan))
    }

    /// Check invariants and report deposit balance drift.
    ///
    /// Operator check; does not need a session.
    pub fn audit(&self) -> Result<Vec<BalanceDrift>> {
        self.data.validate()?;
        let drift = self.data.balance_drift();
        for d in &drift {
            tracing::warn!(
                deposit_id = %d.deposit_id,
                member_id = %d.member_id,
                year = d.year,
                current_balance = %d.current_balance,
                derived_balance = %d.derived_balance,
                "Deposit balance drift"
            );
        }
        Ok(drift)
    }

    fn admin_context(&self) -> Result<Context> {
        let member = self.current_member()?;
        session::require_admin(member)?;
        let created_by = if member.email.is_empty() {
            "system".to_string()
        } else {
            member.email.clone()
        };
        Ok(Context {
            created_by,
            now: Utc::now(),
            reversal_policy: self.config.reversal_policy,
        })
    }

    /// Install a new aggregate and persist it
    fn commit<T>(&mut self, transition: Transition<T>) -> Outcome<T> {
        let Transition {
            data,
            output,
            diagnostics,
        } = transition;

        for diagnostic in &diagnostics {
            tracing::warn!(kind = diagnostic.kind(), "{}", diagnostic);
        }
        self.metrics.record_diagnostics(&diagnostics);

        self.data = data;
        self.metrics.update_members(self.data.members.len());
        self.persist();

        Outcome {
            value: output,
            diagnostics,
        }
    }

    fn persist(&self) {
        let result = storage::encode(&self.data).and_then(|blob| self.storage.save(&blob));
        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to persist ledger");
            self.metrics.record_persist_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReversalPolicy;
    use crate::storage::MemoryStorage;
    use crate::types::{LoanPurpose, Role};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    const ADMIN: &str = "9876543210";
    const MEMBER: &str = "9988776655";

    fn create_test_ledger() -> (Ledger<MemoryStorage>, MemoryStorage) {
        let storage = MemoryStorage::new();
        let ledger = Ledger::with_storage(Config::default(), storage.clone()).unwrap();
        (ledger, storage)
    }

    fn deposit(member: &str, amount: i64) -> DepositRequest {
        DepositRequest {
            member_id: MemberId::new(member),
            amount: Decimal::from(amount),
            year: 2025,
            date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            notes: "April".to_string(),
        }
    }

    struct FailingStorage;

    impl Storage for FailingStorage {
        fn load(&self) -> Result<Option<String>> {
            Ok(None)
        }

        fn save(&self, _blob: &str) -> Result<()> {
            Err(Error::Storage("disk full".to_string()))
        }
    }

    #[test]
    fn test_operations_require_session() {
        let (mut ledger, storage) = create_test_ledger();
        assert!(matches!(ledger.view(), Err(Error::Unauthenticated)));
        assert!(matches!(
            ledger.post_deposit(deposit("M002", 100)),
            Err(Error::Unauthenticated)
        ));
        assert!(storage.snapshot().is_none());

        ledger.login(ADMIN).unwrap();
        ledger.logout();
        assert!(ledger.session().is_none());
        assert!(matches!(
            ledger.close_loan(&LoanId::new("L001")),
            Err(Error::Unauthenticated)
        ));
    }

    #[test]
    fn test_member_role_cannot_mutate() {
        let (mut ledger, _) = create_test_ledger();
        ledger.login(MEMBER).unwrap();
        let before = ledger.data().clone();

        assert!(matches!(
            ledger.post_deposit(deposit("M002", 100)),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            ledger.toggle_member_status(&MemberId::new("M003")),
            Err(Error::Forbidden(_))
        ));
        assert_eq!(ledger.data(), &before);

        // Reading is fine.
        assert_eq!(ledger.view().unwrap().transactions().len(), 0);
    }

    #[test]
    fn test_login_errors() {
        let (mut ledger, _) = create_test_ledger();
        assert!(matches!(ledger.login("1111111111"), Err(Error::NotFound(_))));

        ledger.login(ADMIN).unwrap();
        ledger.toggle_member_status(&MemberId::new("M002")).unwrap();
        ledger.logout();
        assert!(matches!(ledger.login(MEMBER), Err(Error::Disabled(_))));
        assert!(ledger.session().is_none());
    }

    #[test]
    fn test_deposit_persists_and_reloads() {
        let (mut ledger, storage) = create_test_ledger();
        ledger.login(ADMIN).unwrap();
        let tx = ledger.post_deposit(deposit("M003", 2400)).unwrap();
        assert_eq!(tx.created_by, "pandurang@example.com");

        let saved = storage::decode(&storage.snapshot().unwrap()).unwrap();
        assert_eq!(&saved, ledger.data());

        let reopened = Ledger::with_storage(Config::default(), storage.clone()).unwrap();
        let row = reopened
            .data()
            .deposit_for(&MemberId::new("M003"), 2025)
            .unwrap();
        assert_eq!(row.membership_amount, Decimal::from(4800));
        assert!(reopened.session().is_none());
        assert_eq!(
            ledger
                .metrics()
                .transactions_posted
                .with_label_values(&["deposit"])
                .get(),
            1
        );
    }

    #[test]
    fn test_delete_through_ledger() {
        let (mut ledger, _) = create_test_ledger();
        ledger.login(ADMIN).unwrap();
        let before = ledger.data().clone();

        let posted = ledger
            .post_loan_event(LoanEventRequest {
                member_id: MemberId::new("M004"),
                amount: Decimal::from(4000),
                date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
                purpose: LoanPurpose::Repayment,
                notes: "May".to_string(),
            })
            .unwrap();
        assert!(posted.diagnostics.is_empty());

        let deleted = ledger
            .delete_transaction(&posted.value.transaction_id)
            .unwrap()
            .unwrap();
        assert_eq!(deleted.value.amount, Decimal::from(-4000));
        assert_eq!(ledger.data(), &before);
        assert_eq!(ledger.metrics().transactions_deleted.get(), 1);

        assert!(ledger
            .delete_transaction(&posted.value.transaction_id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_strict_policy_rejects_without_change() {
        let storage = MemoryStorage::new();
        let config = Config {
            reversal_policy: ReversalPolicy::Strict,
            ..Config::default()
        };
        let mut ledger = Ledger::with_storage(config, storage.clone()).unwrap();
        ledger.login(ADMIN).unwrap();
        let member = ledger
            .create_member(NewMember {
                name: "NEW".to_string(),
                email: "new@example.com".to_string(),
                mobile: "7000000000".to_string(),
                role: Role::Member,
                status: MemberStatus::Active,
            })
            .unwrap();
        let before = ledger.data().clone();
        let saved = storage.snapshot();

        let result = ledger.post_loan_event(LoanEventRequest {
            member_id: member.member_id.clone(),
            amount: Decimal::from(10),
            date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            purpose: LoanPurpose::Repayment,
            notes: String::new(),
        });
        assert!(matches!(result, Err(Error::NoActiveLoan(_))));
        assert_eq!(ledger.data(), &before);
        assert_eq!(storage.snapshot(), saved);
    }

    #[test]
    fn test_lenient_policy_reports_diagnostics() {
        let (mut ledger, _) = create_test_ledger();
        ledger.login(ADMIN).unwrap();
        let member = ledger
            .create_member(NewMember {
                name: "NEW".to_string(),
                email: "new@example.com".to_string(),
                mobile: "7000000000".to_string(),
                role: Role::Member,
                status: MemberStatus::Active,
            })
            .unwrap();

        let outcome = ledger
            .post_loan_event(LoanEventRequest {
                member_id: member.member_id.clone(),
                amount: Decimal::from(10),
                date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
                purpose: LoanPurpose::Repayment,
                notes: String::new(),
            })
            .unwrap();
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(
            ledger
                .metrics()
                .diagnostics
                .with_label_values(&["no_active_loan"])
                .get(),
            1
        );
    }

    #[test]
    fn test_persist_failure_does_not_fail_mutation() {
        let mut ledger = Ledger::with_storage(Config::default(), FailingStorage).unwrap();
        ledger.login(ADMIN).unwrap();
        let tx = ledger.post_deposit(deposit("M002", 50)).unwrap();
        assert!(ledger.data().transaction(&tx.transaction_id).is_some());
        assert_eq!(ledger.metrics().persist_failures.get(), 1);
    }

    #[test]
    fn test_session_follows_role_changes() {
        let (mut ledger, _) = create_test_ledger();
        ledger.login(ADMIN).unwrap();
        ledger
            .edit_member(
                &MemberId::new("M001"),
                MemberPatch {
                    role: Some(Role::Member),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();

        // Demoted mid-session: the next operation sees the new role.
        assert!(matches!(
            ledger.toggle_member_status(&MemberId::new("M002")),
            Err(Error::Forbidden(_))
        ));
        assert_eq!(ledger.view().unwrap().members().len(), 1);
    }

    #[test]
    fn test_close_loan_through_ledger() {
        let (mut ledger, _) = create_test_ledger();
        ledger.login(ADMIN).unwrap();
        assert!(matches!(
            ledger.close_loan(&LoanId::new("L002")),
            Err(Error::PrincipalOutstanding { .. })
        ));

        ledger
            .post_loan_event(LoanEventRequest {
                member_id: MemberId::new("M002"),
                amount: Decimal::from(174_500),
                date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
                purpose: LoanPurpose::Repayment,
                notes: "settled".to_string(),
            })
            .unwrap();
        let loan = ledger.close_loan(&LoanId::new("L002")).unwrap().unwrap();
        assert!(!loan.is_active());
        assert_eq!(ledger.audit().unwrap(), vec![]);
    }
}
