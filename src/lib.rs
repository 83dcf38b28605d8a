//! CS Ibiza request limiter.
//!
//! This crate implements the fixed-window limiter that marketplace call
//! sites (search, upload, messaging) consult before performing an action.
//! State is process-local and advisory; it does not replace server-side
//! enforcement.

pub mod config;
pub mod error;
pub mod ratelimit;
