//! Core engine for a peer-to-peer skill-exchange marketplace.
//!
//! Users list skills they offer and want, then negotiate bilateral swaps
//! through a request/accept/complete/feedback lifecycle. The interesting
//! machinery is the swap lifecycle engine in [`service`]: transition
//! authorization, double-feedback prevention and the rating/counter side
//! effects that must land atomically with each status change. Persistence
//! goes through the [`store::SwapStore`] contract, backed by sled in
//! production and an in-memory map in tests.

pub mod error;
pub mod service;
pub mod skill;
pub mod store;
pub mod swap;
pub mod user;
pub mod utils;
pub mod validate;
