//! SMS Ledger - financial SMS classifier
//!
//! Reads the device SMS inbox, keeps bank debit/credit notifications, extracts
//! amount, direction and category, and serves a filterable view that is
//! refreshed on a fixed interval.

pub mod classifier;
pub mod config;
pub mod error;
pub mod ledger;
pub mod messages;
pub mod monitor;
pub mod scheduler;
pub mod view;

pub use error::{Error, Result};
