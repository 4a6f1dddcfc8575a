//! Fund Ledger
//!
//! Single-tenant ledger for a small member-owned savings and lending fund.
//!
//! # Architecture
//!
//! - **Single Aggregate**: Members, deposit rows, loans and transactions live
//!   in one [`types::AppData`] value persisted as a single JSON blob
//! - **Pure Transitions**: [`engine`] functions take the aggregate by reference
//!   and return a complete new aggregate, so a failed operation changes nothing
//! - **Role Scoping**: Every read goes through a [`projection::View`] bound to
//!   the logged-in member
//! - **Fire-and-Forget Persistence**: The store is rewritten after each
//!   mutation; a failed write is logged, never surfaced
//!
//! # Invariants
//!
//! - At most one active loan per member
//! - At most one deposit row per (member, year)
//! - Outstanding principal never goes below zero
//! - Deleting a transaction exactly undoes its posting

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod projection;
pub mod seed;
pub mod session;
pub mod storage;
pub mod types;

// Re-exports
pub use config::{Config, ReversalPolicy};
pub use engine::{DepositRequest, Diagnostic, LoanEventRequest, MemberPatch, NewMember};
pub use error::{Error, Result};
pub use ledger::{Ledger, Outcome};
pub use projection::{Dashboard, View};
pub use types::{
    AppData, Deposit, Loan, LoanPurpose, LoanStatus, Member, MemberId, MemberStatus, Role,
    Transaction, TransactionId, TransactionType,
};
