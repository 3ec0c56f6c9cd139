//! The batched user operation entry point for the `MegaETH`.
//!
//! An [`EntryPoint`] accepts batches of [`UserOperation`]s sent by untrusted senders, validates
//! each against its account's and its sponsor's own authorization logic, executes each against
//! arbitrary target code and settles the gas it consumed against prepaid deposits.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod constants;

mod config;
pub use config::*;

mod context;
pub use context::*;

mod entrypoint;
pub use entrypoint::*;

mod error;
pub use error::*;

mod execution;
pub use execution::*;

mod factory;
pub use factory::*;

mod gas;
pub use gas::*;

mod interfaces;
pub use interfaces::*;

mod ledger;
pub use ledger::*;

mod result;
pub use result::*;

mod sponsor;
pub use sponsor::*;

mod state;
pub use state::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod types;
pub use types::*;

mod validation;
pub use validation::*;
