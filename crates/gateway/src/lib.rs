//! HTTP surface for the memory chat service.
//!
//! Thin by design: request/response shapes, base64 image decoding, and
//! route wiring. All behavior lives in `keepsake-chat` and
//! `keepsake-memory`.

pub mod routes;

pub use routes::{AppState, router};
