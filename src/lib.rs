//! HTLC swap agent
//!
//! Drives the storeman side of a two-chain hash-time-locked token bridge:
//! chain and contract resolution per action, call-data construction, gap-free
//! per-chain nonces, signing and submission, and the event signatures a log
//! watcher needs to reconcile swaps.

pub mod api;
pub mod chain;
pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod metrics;
pub mod registry;
pub mod state;
pub mod swap;
pub mod tx;
