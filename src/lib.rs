//! GradeFlow Backend Library
//!
//! Homework submission, AI-assisted grading feedback, and role-based access
//! over a single relational store. Exposed as a library so integration tests
//! can assemble the same router the binary serves.

pub mod ai;
pub mod api;
pub mod auth;
pub mod client;
pub mod middleware;
pub mod models;
pub mod server;
pub mod storage;

pub use server::{build_router, AppState, RateLimiters};
