//! Core types for the fund ledger
//!
//! The persisted aggregate ([`AppData`]) is four independent collections that
//! reference each other only by [`MemberId`]. All types are designed for:
//! - Stable JSON serialization (the whole aggregate is one blob)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix used for generated ids
            pub const PREFIX: &'static str = $prefix;

            /// Wrap an existing id
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random id (`<prefix><8 hex chars>`)
            pub fn generate() -> Self {
                let raw = Uuid::new_v4().simple().to_string().to_uppercase();
                Self(format!("{}{}", $prefix, &raw[..8]))
            }

            /// Get as string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Member identifier
    MemberId,
    "M"
);
string_id!(
    /// Deposit row identifier
    DepositId,
    "DEP"
);
string_id!(
    /// Loan identifier
    LoanId,
    "LN"
);
string_id!(
    /// Transaction identifier
    TransactionId,
    "TX"
);

/// Member role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sees and manages the whole ledger
    Admin,
    /// Sees only their own rows
    Member,
}

/// Member account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    /// Can log in
    Active,
    /// Soft-disabled; history is retained
    Inactive,
}

impl MemberStatus {
    /// The opposite status
    pub fn toggled(self) -> Self {
        match self {
            MemberStatus::Active => MemberStatus::Inactive,
            MemberStatus::Inactive => MemberStatus::Active,
        }
    }
}

/// Loan lifecycle status: `(none) -> Active -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// Open loan; at most one per member
    Active,
    /// Terminal
    Closed,
}

/// Ledger entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Membership deposit
    Deposit,
    /// Loan disbursement (positive) or repayment (negative)
    Loan,
    /// Interest received; never touches principal
    Interest,
    /// Manual adjustment / migration entry
    Adjustment,
}

impl TransactionType {
    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Loan => "loan",
            TransactionType::Interest => "interest",
            TransactionType::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purpose of a loan-side posting. Not persisted; the stored transaction keeps
/// only the derived type and signed amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanPurpose {
    /// Money lent to the member
    Disbursement,
    /// Principal paid back
    Repayment,
    /// Interest paid
    Interest,
}

impl LoanPurpose {
    /// Transaction type recorded for this purpose
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            LoanPurpose::Disbursement | LoanPurpose::Repayment => TransactionType::Loan,
            LoanPurpose::Interest => TransactionType::Interest,
        }
    }

    /// Signed amount stored on the transaction for an entered amount
    pub fn signed_amount(&self, amount: Decimal) -> Decimal {
        match self {
            LoanPurpose::Repayment => -amount,
            LoanPurpose::Disbursement | LoanPurpose::Interest => amount,
        }
    }

    /// Capitalised label used as the notes prefix
    pub fn label(&self) -> &'static str {
        match self {
            LoanPurpose::Disbursement => "Disbursement",
            LoanPurpose::Repayment => "Repayment",
            LoanPurpose::Interest => "Interest",
        }
    }
}

/// Fund member. Never physically deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Unique member id
    pub member_id: MemberId,
    /// Display name
    pub name: String,
    /// Contact email (also recorded as `created_by`)
    pub email: String,
    /// Login key; unique across members
    pub mobile: String,
    /// Access role
    pub role: Role,
    /// Account status
    pub status: MemberStatus,
}

impl Member {
    /// Whether the member has the admin role
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the member can log in
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// Yearly deposit account, one per `(member_id, year)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Deposit row id
    pub deposit_id: DepositId,
    /// Owning member
    pub member_id: MemberId,
    /// Balance carried in from the previous year
    pub opening_balance: Decimal,
    /// Cumulative year-to-date membership deposits
    pub membership_amount: Decimal,
    /// Dividend credited for the year
    pub dividend: Decimal,
    /// Running balance, adjusted incrementally on each posting and reversal
    pub current_balance: Decimal,
    /// Calendar year
    pub year: i32,
}

impl Deposit {
    /// Zero-balance row
    pub fn empty(deposit_id: DepositId, member_id: MemberId, year: i32) -> Self {
        Self {
            deposit_id,
            member_id,
            opening_balance: Decimal::ZERO,
            membership_amount: Decimal::ZERO,
            dividend: Decimal::ZERO,
            current_balance: Decimal::ZERO,
            year,
        }
    }

    /// Balance recomputed from its components
    pub fn derived_balance(&self) -> Decimal {
        self.opening_balance + self.membership_amount + self.dividend
    }
}

/// Member loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    /// Loan id
    pub loan_id: LoanId,
    /// Borrower
    pub member_id: MemberId,
    /// Total disbursed
    pub loan_amount: Decimal,
    /// Principal still owed; never negative
    pub outstanding_principal: Decimal,
    /// Monthly rate in percent
    pub interest_rate: Decimal,
    /// Date of the first disbursement
    pub loan_start_date: NaiveDate,
    /// Lifecycle status
    pub loan_status: LoanStatus,
}

impl Loan {
    /// Default monthly interest rate (percent)
    pub const DEFAULT_INTEREST_RATE: Decimal = Decimal::ONE;

    /// Whether this is the member's open loan
    pub fn is_active(&self) -> bool {
        self.loan_status == LoanStatus::Active
    }

    /// Next month's interest on the outstanding principal at `rate`
    pub fn estimated_monthly_interest(&self, rate: Decimal) -> Decimal {
        self.outstanding_principal * rate
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction id
    pub transaction_id: TransactionId,
    /// Member the entry belongs to
    pub member_id: MemberId,
    /// Entry kind
    pub transaction_type: TransactionType,
    /// Signed amount (negative for repayments)
    pub amount: Decimal,
    /// Value date
    pub transaction_month: NaiveDate,
    /// Free text; deposits embed `[year]`
    pub notes: String,
    /// Email of the posting member, or `system`
    pub created_by: String,
    /// Posting timestamp
    pub created_at: DateTime<Utc>,
    /// Deposit year the posting was applied to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

fn year_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"\[(\d{4})\]").expect("static regex"))
}

impl Transaction {
    /// Deposit year this entry was posted to.
    ///
    /// Resolution order: the structured `year` field, the `[yyyy]` tag in the
    /// notes, then the calendar year of `transaction_month`.
    pub fn deposit_year(&self) -> i32 {
        if let Some(year) = self.year {
            return year;
        }
        year_tag()
            .captures(&self.notes)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or_else(|| self.transaction_month.year())
    }
}

/// Aggregate root: the whole persisted ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppData {
    /// Members
    pub members: Vec<Member>,
    /// Yearly deposit rows
    pub deposits: Vec<Deposit>,
    /// Loans
    pub loans: Vec<Loan>,
    /// Append-only transaction log
    pub transactions: Vec<Transaction>,
}

/// Deposit whose running balance no longer matches its components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDrift {
    /// Affected row
    pub deposit_id: DepositId,
    /// Owning member
    pub member_id: MemberId,
    /// Year of the row
    pub year: i32,
    /// Stored running balance
    pub current_balance: Decimal,
    /// `opening_balance + membership_amount + dividend`
    pub derived_balance: Decimal,
}

impl AppData {
    /// Find member by id
    pub fn member(&self, member_id: &MemberId) -> Option<&Member> {
        self.members.iter().find(|m| &m.member_id == member_id)
    }

    /// Find member by exact mobile match
    pub fn member_by_mobile(&self, mobile: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.mobile == mobile)
    }

    /// Deposit row for `(member_id, year)`
    pub fn deposit_for(&self, member_id: &MemberId, year: i32) -> Option<&Deposit> {
        self.deposits
            .iter()
            .find(|d| &d.member_id == member_id && d.year == year)
    }

    /// Find loan by id
    pub fn loan(&self, loan_id: &LoanId) -> Option<&Loan> {
        self.loans.iter().find(|l| &l.loan_id == loan_id)
    }

    /// Find transaction by id
    pub fn transaction(&self, transaction_id: &TransactionId) -> Option<&Transaction> {
        self.transactions
            .iter()
            .find(|t| &t.transaction_id == transaction_id)
    }

    /// Index of the member's single active loan.
    ///
    /// Errors if more than one active loan exists for the member.
    pub fn active_loan_position(&self, member_id: &MemberId) -> crate::Result<Option<usize>> {
        let mut found = None;
        for (idx, loan) in self.loans.iter().enumerate() {
            if &loan.member_id == member_id && loan.is_active() {
                if found.is_some() {
                    return Err(crate::Error::InvariantViolation(format!(
                        "member {} has more than one active loan",
                        member_id
                    )));
                }
                found = Some(idx);
            }
        }
        Ok(found)
    }

    /// The member's active loan, if any
    pub fn active_loan(&self, member_id: &MemberId) -> crate::Result<Option<&Loan>> {
        Ok(self.active_loan_position(member_id)?.map(|idx| &self.loans[idx]))
    }

    /// Number of members with `Active` status
    pub fn active_member_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_active()).count()
    }

    /// Check the structural invariants of the aggregate
    pub fn validate(&self) -> crate::Result<()> {
        let mut ids = HashSet::new();
        let mut mobiles = HashSet::new();
        for member in &self.members {
            if !ids.insert(&member.member_id) {
                return Err(crate::Error::InvariantViolation(format!(
                    "duplicate member id {}",
                    member.member_id
                )));
            }
            if !mobiles.insert(member.mobile.as_str()) {
                return Err(crate::Error::InvariantViolation(format!(
                    "duplicate mobile {}",
                    member.mobile
                )));
            }
        }

        let mut deposit_keys = HashSet::new();
        for deposit in &self.deposits {
            if !deposit_keys.insert((&deposit.member_id, deposit.year)) {
                return Err(crate::Error::InvariantViolation(format!(
                    "member {} has more than one deposit row for {}",
                    deposit.member_id, deposit.year
                )));
            }
        }

        let mut active_loans: HashMap<&MemberId, &LoanId> = HashMap::new();
        for loan in &self.loans {
            if loan.outstanding_principal < Decimal::ZERO {
                return Err(crate::Error::InvariantViolation(format!(
                    "loan {} has negative principal {}",
                    loan.loan_id, loan.outstanding_principal
                )));
            }
            if loan.is_active() {
                if let Some(other) = active_loans.insert(&loan.member_id, &loan.loan_id) {
                    return Err(crate::Error::InvariantViolation(format!(
                        "member {} has active loans {} and {}",
                        loan.member_id, other, loan.loan_id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Deposits whose running balance drifted from its components
    pub fn balance_drift(&self) -> Vec<BalanceDrift> {
        self.deposits
            .iter()
            .filter(|d| d.current_balance != d.derived_balance())
            .map(|d| BalanceDrift {
                deposit_id: d.deposit_id.clone(),
                member_id: d.member_id.clone(),
                year: d.year,
                current_balance: d.current_balance,
                derived_balance: d.derived_balance(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(notes: &str, year: Option<i32>) -> Transaction {
        Transaction {
            transaction_id: TransactionId::new("TX1"),
            member_id: MemberId::new("M001"),
            transaction_type: TransactionType::Deposit,
            amount: Decimal::from(100),
            transaction_month: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            notes: notes.to_string(),
            created_by: "system".to_string(),
            created_at: Utc::now(),
            year,
        }
    }

    #[test]
    fn test_deposit_year_resolution() {
        assert_eq!(tx("Yearly Membership [2025]: x", Some(2026)).deposit_year(), 2026);
        assert_eq!(tx("Yearly Membership [2025]: x", None).deposit_year(), 2025);
        assert_eq!(tx("no tag here", None).deposit_year(), 2024);
        assert_eq!(tx("[25] short tag", None).deposit_year(), 2024);
    }

    #[test]
    fn test_generated_id_prefix() {
        let id = DepositId::generate();
        assert!(id.as_str().starts_with("DEP"));
        assert_eq!(id.as_str().len(), 11);
        assert_ne!(MemberId::generate(), MemberId::generate());
    }

    #[test]
    fn test_loan_purpose_sign() {
        let amount = Decimal::from(500);
        assert_eq!(LoanPurpose::Disbursement.signed_amount(amount), amount);
        assert_eq!(LoanPurpose::Repayment.signed_amount(amount), -amount);
        assert_eq!(
            LoanPurpose::Interest.transaction_type(),
            TransactionType::Interest
        );
    }

    #[test]
    fn test_enum_wire_format() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(
            serde_json::to_string(&MemberStatus::Inactive).unwrap(),
            "\"inactive\""
        );
        assert_eq!(
            serde_json::from_str::<TransactionType>("\"adjustment\"").unwrap(),
            TransactionType::Adjustment
        );
    }

    #[test]
    fn test_validate_rejects_second_active_loan() {
        let mut data = crate::seed::initial_data();
        let mut dup = data.loans[0].clone();
        dup.loan_id = LoanId::new("L999");
        data.loans.push(dup);
        assert!(matches!(
            data.validate(),
            Err(crate::Error::InvariantViolation(_))
        ));
        assert!(data.active_loan(&MemberId::new("M001")).is_err());
    }

    #[test]
    fn test_balance_drift_detected() {
        let mut data = crate::seed::initial_data();
        assert!(data.balance_drift().is_empty());
        data.deposits[1].current_balance += Decimal::ONE;
        let drift = data.balance_drift();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].member_id, MemberId::new("M002"));
    }
}
