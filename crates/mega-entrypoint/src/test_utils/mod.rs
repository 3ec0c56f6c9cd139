//! Test utilities for the `MegaETH` entry point: reference accounts, sponsors and targets, and a
//! ready-made engine to run them in.

mod account;
mod harness;
mod signer;
mod sponsor;
mod targets;

pub use account::*;
pub use harness::*;
pub use signer::*;
pub use sponsor::*;
pub use targets::*;
