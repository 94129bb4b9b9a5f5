//! HTTP API
//!
//! One module per resource, each exposing `router()` with its routes
//! nested under `/api/<resource>`.
//!
//! - [`health`] - liveness and database reachability (public)
//! - [`auth`] - login, current user, password change
//! - [`audit_log`] - audit trail query and chain verification
//! - [`staff_users`] - staff accounts (admin)
//! - [`patients`], [`insurance`] - patient records
//! - [`providers`], [`pharmacies`], [`services`], [`tags`], [`discounts`] - catalog
//! - [`orders`], [`invoices`] - orders and billing
//! - [`sessions`], [`consultations`] - scheduling and clinical notes
//! - [`tasks`], [`tickets`] - staff work and messaging
//! - [`forms`] - form builder and submissions
//! - [`dashboard`] - front-page counters

pub mod auth;
pub mod health;

pub mod audit_log;
pub mod staff_users;

// Patients
pub mod insurance;
pub mod patients;

// Catalog
pub mod discounts;
pub mod pharmacies;
pub mod providers;
pub mod services;
pub mod tags;

// Orders & billing
pub mod invoices;
pub mod orders;

// Scheduling & clinical
pub mod consultations;
pub mod sessions;

// Work
pub mod tasks;
pub mod tickets;

pub mod dashboard;
pub mod forms;

// Re-export common types for handlers
pub use crate::utils::{AppError, AppResult};
