//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, serving order)
//!     → request.rs (request ID)
//!     → websocket.rs (hot-reload upgrades, dev only)
//!     → proxy.rs (dev assets, API prefix)
//!     → [project resolution + dispatch]
//!     → response.rs (not-found and error pages)
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
pub use websocket::HmrRelay;
