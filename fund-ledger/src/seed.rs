//! Default dataset used when no persisted store exists

use crate::types::{
    AppData, Deposit, DepositId, Loan, LoanId, LoanStatus, Member, MemberId, MemberStatus, Role,
    Transaction, TransactionId, TransactionType,
};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

const SEED_YEAR: i32 = 2025;

fn member(id: &str, name: &str, email: &str, mobile: &str, role: Role) -> Member {
    Member {
        member_id: MemberId::new(id),
        name: name.to_string(),
        email: email.to_string(),
        mobile: mobile.to_string(),
        role,
        status: MemberStatus::Active,
    }
}

// Amounts are in paise.
fn deposit(id: &str, member_id: &str, opening: i64, membership: i64, dividend: i64) -> Deposit {
    let opening_balance = Decimal::new(opening, 2);
    let membership_amount = Decimal::new(membership, 2);
    let dividend = Decimal::new(dividend, 2);
    Deposit {
        deposit_id: DepositId::new(id),
        member_id: MemberId::new(member_id),
        opening_balance,
        membership_amount,
        dividend,
        current_balance: opening_balance + membership_amount + dividend,
        year: SEED_YEAR,
    }
}

fn loan(id: &str, member_id: &str, amount: i64) -> Loan {
    Loan {
        loan_id: LoanId::new(id),
        member_id: MemberId::new(member_id),
        loan_amount: Decimal::from(amount),
        outstanding_principal: Decimal::from(amount),
        interest_rate: Loan::DEFAULT_INTEREST_RATE,
        loan_start_date: start_of_seed_year(),
        loan_status: LoanStatus::Active,
    }
}

fn start_of_seed_year() -> NaiveDate {
    NaiveDate::from_ymd_opt(SEED_YEAR, 1, 1).unwrap_or_default()
}

/// Seeded dataset: one admin and three members, each with a 2025 deposit row
/// and an active loan.
pub fn initial_data() -> AppData {
    AppData {
        members: vec![
            member(
                "M001",
                "PANDURANG LAXMAN PARDALE",
                "pandurang@example.com",
                "9876543210",
                Role::Admin,
            ),
            member(
                "M002",
                "RAMESH LAXMAN PARDALE",
                "ramesh@example.com",
                "9988776655",
                Role::Member,
            ),
            member(
                "M003",
                "PRAKASH SHANTARAM PARDALE",
                "prakash@example.com",
                "9123456789",
                Role::Member,
            ),
            member(
                "M004",
                "PARESH PRAKASH PARDALE",
                "paresh@example.com",
                "8877665544",
                Role::Member,
            ),
        ],
        deposits: vec![
            deposit("D001", "M001", 21_050_316, 240_000, 2_607_379),
            deposit("D002", "M002", 13_382_573, 240_000, 1_657_621),
            deposit("D003", "M003", 21_050_316, 240_000, 2_607_379),
            deposit("D004", "M004", 13_382_573, 240_000, 1_657_621),
        ],
        loans: vec![
            loan("L001", "M001", 286_000),
            loan("L002", "M002", 174_500),
            loan("L003", "M003", 275_000),
            loan("L004", "M004", 164_000),
        ],
        transactions: vec![Transaction {
            transaction_id: TransactionId::new("T000"),
            member_id: MemberId::new("M001"),
            transaction_type: TransactionType::Adjustment,
            amount: Decimal::new(21_050_316, 2),
            transaction_month: start_of_seed_year(),
            notes: "Initial opening balance migration".to_string(),
            created_by: "system".to_string(),
            created_at: Utc
                .with_ymd_and_hms(SEED_YEAR, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            year: None,
        }],
    }
}
