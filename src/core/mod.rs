//! Core protocol data
//!
//! Transactions with their canonical wire encoding and content
//! addresses, plus the big-integer fee schedule.

pub mod fee;
pub mod transaction;

pub use fee::{compute_fee_schedule, FeeSchedule};
pub use transaction::{compile_instruction, Transaction, TransactionError, ADDRESS_LEN};
