//! tarot-adviser - resilient tarot reading generation
//!
//! Turns a question and a set of drawn cards into a structured reading.
//! A remote text-generation backend is used when credentials are
//! available; timeouts, retries, caching and a deterministic local
//! reading keep every call answered.

pub mod adviser;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod parser;
pub mod prompt;
pub mod result;
pub mod telemetry;
pub mod usecase;
