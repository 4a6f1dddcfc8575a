//! Ledger state transitions
//!
//! Every operation takes the current aggregate by reference and returns a
//! complete new aggregate in a [`Transition`]. Callers swap the whole value in
//! on success, so a half-applied update across transactions, deposits and
//! loans is never observable. Preconditions are checked before the copy is
//! touched.
//!
//! # Sign convention
//!
//! | purpose      | type     | stored amount | loan effect                         |
//! |--------------|----------|---------------|-------------------------------------|
//! | disbursement | loan     | `+amount`     | principal and loan amount increase  |
//! | repayment    | loan     | `-amount`     | principal decreases, floored at 0   |
//! | interest     | interest | `+amount`     | none                                |

use crate::{
    config::ReversalPolicy,
    types::{
        AppData, Deposit, DepositId, Loan, LoanId, LoanPurpose, LoanStatus, Member, MemberId,
        MemberStatus, Role, Transaction, TransactionId, TransactionType,
    },
    Error, Result,
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who is acting, and when
#[derive(Debug, Clone)]
pub struct Context {
    /// Recorded as `created_by` on new transactions
    pub created_by: String,
    /// Clock reading for the operation
    pub now: DateTime<Utc>,
    /// Handling of missing rows
    pub reversal_policy: ReversalPolicy,
}

impl Context {
    /// Context for a system actor at the current time
    pub fn system() -> Self {
        Self {
            created_by: "system".to_string(),
            now: Utc::now(),
            reversal_policy: ReversalPolicy::default(),
        }
    }
}

/// Side effect that could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// No deposit row to reverse a deposit against
    MissingDepositRow {
        /// Member of the deleted deposit
        member_id: MemberId,
        /// Year resolved from the transaction
        year: i32,
    },
    /// No active loan to apply a repayment or reversal to
    NoActiveLoan {
        /// Member of the posting
        member_id: MemberId,
    },
    /// Repayment or reversal would have driven principal below zero
    PrincipalFloored {
        /// Affected loan
        loan_id: LoanId,
        /// Amount that could not be reversed
        shortfall: Decimal,
    },
}

impl Diagnostic {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::MissingDepositRow { .. } => "missing_deposit_row",
            Diagnostic::NoActiveLoan { .. } => "no_active_loan",
            Diagnostic::PrincipalFloored { .. } => "principal_floored",
        }
    }

    fn into_error(self) -> Error {
        match self {
            Diagnostic::NoActiveLoan { member_id } => Error::NoActiveLoan(member_id),
            other => Error::ReversalInconsistency(other.to_string()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingDepositRow { member_id, year } => {
                write!(f, "no deposit row for member {} in {}", member_id, year)
            }
            Diagnostic::NoActiveLoan { member_id } => {
                write!(f, "no active loan for member {}", member_id)
            }
            Diagnostic::PrincipalFloored { loan_id, shortfall } => {
                write!(f, "loan {} principal floored at zero, {} not applied", loan_id, shortfall)
            }
        }
    }
}

/// New aggregate plus the operation's result
#[derive(Debug, Clone)]
pub struct Transition<T> {
    /// Aggregate to install
    pub data: AppData,
    /// Operation output
    pub output: T,
    /// Side effects that were skipped
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Transition<T> {
    fn new(data: AppData, output: T) -> Self {
        Self {
            data,
            output,
            diagnostics: Vec::new(),
        }
    }
}

/// Deposit posting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Depositing member
    pub member_id: MemberId,
    /// Amount; any sign is accepted
    pub amount: Decimal,
    /// Deposit year the amount is credited to
    pub year: i32,
    /// Value date
    pub date: NaiveDate,
    /// Free-text notes
    pub notes: String,
}

/// Loan-side posting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanEventRequest {
    /// Borrowing member
    pub member_id: MemberId,
    /// Entered amount; must be positive
    pub amount: Decimal,
    /// Value date
    pub date: NaiveDate,
    /// What the money is for
    pub purpose: LoanPurpose,
    /// Free-text notes
    pub notes: String,
}

/// Fields of a new member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMember {
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Login mobile
    pub mobile: String,
    /// Access role
    pub role: Role,
    /// Initial status
    pub status: MemberStatus,
}

/// Partial member update; `None` fields are left as they are
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberPatch {
    /// New name
    pub name: Option<String>,
    /// New email
    pub email: Option<String>,
    /// New mobile
    pub mobile: Option<String>,
    /// New role
    pub role: Option<Role>,
    /// New status
    pub status: Option<MemberStatus>,
}

/// Record a membership deposit and credit the `(member, year)` deposit row,
/// opening it if needed.
pub fn post_deposit(
    data: &AppData,
    ctx: &Context,
    req: &DepositRequest,
) -> Result<Transition<Transaction>> {
    require_member(data, &req.member_id)?;

    let mut next = data.clone();
    let transaction = Transaction {
        transaction_id: fresh_transaction_id(&next),
        member_id: req.member_id.clone(),
        transaction_type: TransactionType::Deposit,
        amount: req.amount,
        transaction_month: req.date,
        notes: format!("Yearly Membership [{}]: {}", req.year, req.notes),
        created_by: ctx.created_by.clone(),
        created_at: ctx.now,
        year: Some(req.year),
    };
    next.transactions.push(transaction.clone());

    let new_deposit_id = fresh_deposit_id(&next);
    match next
        .deposits
        .iter_mut()
        .find(|d| d.member_id == req.member_id && d.year == req.year)
    {
        Some(deposit) => {
            deposit.current_balance += req.amount;
            deposit.membership_amount += req.amount;
        }
        None => next.deposits.push(Deposit {
            membership_amount: req.amount,
            current_balance: req.amount,
            ..Deposit::empty(new_deposit_id, req.member_id.clone(), req.year)
        }),
    }

    Ok(Transition::new(next, transaction))
}

/// Record a disbursement, repayment or interest payment.
///
/// The transaction is appended even when a repayment finds no active loan or
/// exceeds the outstanding principal; those cases are reported as
/// [`Diagnostic::NoActiveLoan`] and [`Diagnostic::PrincipalFloored`] (or
/// rejected under [`ReversalPolicy::Strict`]).
pub fn post_loan_event(
    data: &AppData,
    ctx: &Context,
    req: &LoanEventRequest,
) -> Result<Transition<Transaction>> {
    if req.amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "loan {} amount must be positive, got {}",
            req.purpose.label().to_lowercase(),
            req.amount
        )));
    }
    require_member(data, &req.member_id)?;
    let active = data.active_loan_position(&req.member_id)?;

    let mut diagnostics = Vec::new();
    if req.purpose == LoanPurpose::Repayment {
        match active {
            None => reject_or_record(
                ctx,
                &mut diagnostics,
                Diagnostic::NoActiveLoan {
                    member_id: req.member_id.clone(),
                },
            )?,
            Some(idx) => {
                let loan = &data.loans[idx];
                let shortfall = req.amount - loan.outstanding_principal;
                if shortfall > Decimal::ZERO {
                    reject_or_record(
                        ctx,
                        &mut diagnostics,
                        Diagnostic::PrincipalFloored {
                            loan_id: loan.loan_id.clone(),
                            shortfall,
                        },
                    )?;
                }
            }
        }
    }

    let mut next = data.clone();
    let transaction = Transaction {
        transaction_id: fresh_transaction_id(&next),
        member_id: req.member_id.clone(),
        transaction_type: req.purpose.transaction_type(),
        amount: req.purpose.signed_amount(req.amount),
        transaction_month: req.date,
        notes: format!("{}: {}", req.purpose.label(), req.notes),
        created_by: ctx.created_by.clone(),
        created_at: ctx.now,
        year: None,
    };
    next.transactions.push(transaction.clone());

    match (req.purpose, active) {
        (LoanPurpose::Disbursement, Some(idx)) => {
            let loan = &mut next.loans[idx];
            loan.outstanding_principal += req.amount;
            loan.loan_amount += req.amount;
        }
        (LoanPurpose::Disbursement, None) => {
            let loan_id = fresh_loan_id(&next);
            next.loans.push(Loan {
                loan_id,
                member_id: req.member_id.clone(),
                loan_amount: req.amount,
                outstanding_principal: req.amount,
                interest_rate: Loan::DEFAULT_INTEREST_RATE,
                loan_start_date: req.date,
                loan_status: LoanStatus::Active,
            });
        }
        (LoanPurpose::Repayment, Some(idx)) => {
            let loan = &mut next.loans[idx];
            loan.outstanding_principal =
                (loan.outstanding_principal - req.amount).max(Decimal::ZERO);
        }
        (LoanPurpose::Repayment, None) | (LoanPurpose::Interest, _) => {}
    }

    Ok(Transition {
        data: next,
        output: transaction,
        diagnostics,
    })
}

/// Remove a transaction and reverse what it did to deposits and loans.
///
/// Returns `Ok(None)` when the id is unknown. The removed transaction is the
/// transition output.
pub fn delete_transaction(
    data: &AppData,
    ctx: &Context,
    transaction_id: &TransactionId,
) -> Result<Option<Transition<Transaction>>> {
    let Some(position) = data
        .transactions
        .iter()
        .position(|t| &t.transaction_id == transaction_id)
    else {
        return Ok(None);
    };

    let mut next = data.clone();
    let transaction = next.transactions.remove(position);
    let mut diagnostics = Vec::new();

    match transaction.transaction_type {
        TransactionType::Deposit => {
            let year = transaction.deposit_year();
            match next
                .deposits
                .iter_mut()
                .find(|d| d.member_id == transaction.member_id && d.year == year)
            {
                Some(deposit) => {
                    deposit.current_balance -= transaction.amount;
                    deposit.membership_amount -= transaction.amount;
                }
                None => reject_or_record(
                    ctx,
                    &mut diagnostics,
                    Diagnostic::MissingDepositRow {
                        member_id: transaction.member_id.clone(),
                        year,
                    },
                )?,
            }
        }
        TransactionType::Loan => match next.active_loan_position(&transaction.member_id)? {
            Some(idx) => {
                let loan = &mut next.loans[idx];
                if transaction.amount > Decimal::ZERO {
                    let shortfall = transaction.amount - loan.outstanding_principal;
                    loan.outstanding_principal =
                        (loan.outstanding_principal - transaction.amount).max(Decimal::ZERO);
                    loan.loan_amount = (loan.loan_amount - transaction.amount).max(Decimal::ZERO);
                    if shortfall > Decimal::ZERO {
                        let loan_id = loan.loan_id.clone();
                        reject_or_record(
                            ctx,
                            &mut diagnostics,
                            Diagnostic::PrincipalFloored { loan_id, shortfall },
                        )?;
                    }
                } else {
                    loan.outstanding_principal += transaction.amount.abs();
                }
            }
            None => reject_or_record(
                ctx,
                &mut diagnostics,
                Diagnostic::NoActiveLoan {
                    member_id: transaction.member_id.clone(),
                },
            )?,
        },
        TransactionType::Interest | TransactionType::Adjustment => {}
    }

    Ok(Some(Transition {
        data: next,
        output: transaction,
        diagnostics,
    }))
}

/// Add a member and open a zero-balance deposit row for the current year
pub fn create_member(
    data: &AppData,
    ctx: &Context,
    new_member: &NewMember,
) -> Result<Transition<Member>> {
    if data.member_by_mobile(&new_member.mobile).is_some() {
        return Err(Error::DuplicateMobile(new_member.mobile.clone()));
    }

    let mut next = data.clone();
    let member_id = fresh_id(MemberId::generate, |id| next.member(id).is_some());
    let member = Member {
        member_id: member_id.clone(),
        name: new_member.name.clone(),
        email: new_member.email.clone(),
        mobile: new_member.mobile.clone(),
        role: new_member.role,
        status: new_member.status,
    };
    let deposit_id = fresh_deposit_id(&next);
    next.members.push(member.clone());
    next.deposits
        .push(Deposit::empty(deposit_id, member_id, ctx.now.year()));

    Ok(Transition::new(next, member))
}

/// Overwrite the supplied fields of a member. `Ok(None)` if the id is unknown.
pub fn edit_member(
    data: &AppData,
    member_id: &MemberId,
    patch: &MemberPatch,
) -> Result<Option<Transition<Member>>> {
    let Some(position) = data.members.iter().position(|m| &m.member_id == member_id) else {
        return Ok(None);
    };
    if let Some(mobile) = &patch.mobile {
        if data
            .members
            .iter()
            .any(|m| &m.mobile == mobile && &m.member_id != member_id)
        {
            return Err(Error::DuplicateMobile(mobile.clone()));
        }
    }

    let mut next = data.clone();
    let member = &mut next.members[position];
    if let Some(name) = &patch.name {
        member.name = name.clone();
    }
    if let Some(email) = &patch.email {
        member.email = email.clone();
    }
    if let Some(mobile) = &patch.mobile {
        member.mobile = mobile.clone();
    }
    if let Some(role) = patch.role {
        member.role = role;
    }
    if let Some(status) = patch.status {
        member.status = status;
    }
    let member = member.clone();

    Ok(Some(Transition::new(next, member)))
}

/// Flip a member between active and inactive. Deposits, loans and
/// transactions are untouched.
pub fn toggle_member_status(
    data: &AppData,
    member_id: &MemberId,
) -> Option<Transition<MemberStatus>> {
    let position = data.members.iter().position(|m| &m.member_id == member_id)?;
    let mut next = data.clone();
    let member = &mut next.members[position];
    member.status = member.status.toggled();
    let status = member.status;
    Some(Transition::new(next, status))
}

/// Close a fully repaid loan.
///
/// `Ok(None)` if the loan is unknown or already closed; closed is terminal.
pub fn close_loan(data: &AppData, loan_id: &LoanId) -> Result<Option<Transition<Loan>>> {
    let Some(position) = data.loans.iter().position(|l| &l.loan_id == loan_id) else {
        return Ok(None);
    };
    let loan = &data.loans[position];
    if !loan.is_active() {
        return Ok(None);
    }
    if loan.outstanding_principal > Decimal::ZERO {
        return Err(Error::PrincipalOutstanding {
            loan_id: loan.loan_id.clone(),
            outstanding: loan.outstanding_principal,
        });
    }

    let mut next = data.clone();
    next.loans[position].loan_status = LoanStatus::Closed;
    let loan = next.loans[position].clone();
    Ok(Some(Transition::new(next, loan)))
}

fn require_member(data: &AppData, member_id: &MemberId) -> Result<()> {
    match data.member(member_id) {
        Some(_) => Ok(()),
        None => Err(Error::NotFound(format!("member {}", member_id))),
    }
}

fn reject_or_record(
    ctx: &Context,
    diagnostics: &mut Vec<Diagnostic>,
    diagnostic: Diagnostic,
) -> Result<()> {
    match ctx.reversal_policy {
        ReversalPolicy::Strict => Err(diagnostic.into_error()),
        ReversalPolicy::Lenient => {
            diagnostics.push(diagnostic);
            Ok(())
        }
    }
}

fn fresh_id<T>(generate: impl Fn() -> T, taken: impl Fn(&T) -> bool) -> T {
    loop {
        let id = generate();
        if !taken(&id) {
            return id;
        }
    }
}

fn fresh_transaction_id(data: &AppData) -> TransactionId {
    fresh_id(TransactionId::generate, |id| data.transaction(id).is_some())
}

fn fresh_deposit_id(data: &AppData) -> DepositId {
    fresh_id(DepositId::generate, |id| {
        data.deposits.iter().any(|d| &d.deposit_id == id)
    })
}

fn fresh_loan_id(data: &AppData) -> LoanId {
    fresh_id(LoanId::generate, |id| data.loan(id).is_some())
}
