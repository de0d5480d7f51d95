//! HTTP surface of the scraper.
//!
//! - `GET /` liveness probe, always `OK`
//! - `POST /scrape` `{ "url": ... }`: launch a browser, navigate, run the
//!   page orchestrator, respond with the marker value (or `null`)
//!
//! The router is generic over the browser launcher so tests can serve it
//! with the in-memory browser from `clicktrace-extract`.
pub mod error;
pub mod routes;
pub mod scrape;
pub mod server;

pub use error::ScrapeError;
pub use routes::create_router;
pub use scrape::{ScrapeRequest, ScrapeResponse, ScrapeState};
pub use server::ScrapeServer;
