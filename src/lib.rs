//! CRM Lead Allocator Library
//!
//! Polls a CRM lead list page on a fixed interval, detects leads that were not
//! listed before, and claims them into the operator's bucket with a batch
//! allocation request.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `crm_client`: CRM HTTP client (lead list, allocation, login).
//! - `errors`: Error handling types.
//! - `lead_parser`: Lead extraction from the lead list markup.
//! - `models`: Core data models.
//! - `poller`: Poll loop with single-flight guard.
//! - `seen_set`: In-memory record of observed leads.
//! - `shutdown`: Operator stop signals.

pub mod config;
pub mod crm_client;
pub mod errors;
pub mod lead_parser;
pub mod models;
pub mod poller;
pub mod seen_set;
pub mod shutdown;
