//! Decision Drift - Billing backend for the Decision Drift browser extension
//!
//! This crate keeps a per-user Pro entitlement in step with Stripe. Billing
//! signals from webhooks, post-checkout activation and live status checks all
//! funnel through a single reconciliation step that derives plan and license
//! state from the subscription status.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
