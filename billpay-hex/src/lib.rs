//! # Billpay Hex
//!
//! Wallet service and HTTP adapter for the bill-payment engine.
//!
//! ## Architecture
//!
//! - `service/` - Settlement engine, wallet funding and dashboard rollups
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! The service is generic over the ledger, the billing provider and the
//! payment channel, so each can be swapped for a test double.

pub mod inbound;
pub mod service;


pub use service::WalletService;
