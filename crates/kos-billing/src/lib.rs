//! Billing lifecycle and due-date notifications for a boarding house.
//!
//! [`billing`] holds the domain, the storage ports and the components that
//! generate bills, reconcile payments, schedule reminders and dispatch them.

pub mod billing;
pub mod config;
pub mod error;
pub mod telemetry;
