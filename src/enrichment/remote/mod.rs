//! Remote metadata service integration
//!
//! HTTP client, wire DTOs, and the adapter that turns batch responses into
//! per-identifier fetch results.

mod adapter;
mod client;
pub mod dto;

pub use adapter::to_fetch_results;
pub use client::RemoteClient;
