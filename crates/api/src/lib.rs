//! Drawbridge API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! providers, decision-channel plumbing) so integration tests and the
//! binary entrypoint can both access them.

pub mod background;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod oauth;
pub mod providers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
