//! Wallet ledger transaction engine.
//!
//! Monetary wallets with an immutable audit ledger: top-up, payment,
//! inter-wallet transfer, suspension, and balance inquiry, each mutation
//! executed as one atomic unit of work under exclusive row locks.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
