//! Listing photo autofill
//!
//! Classifies and describes marketplace listing photos through Cloudflare
//! Workers AI, with a bounded-concurrency batch scheduler and a one-shot
//! coordinator that discards superseded results.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
