//! Multi-tenant site server.
//!
//! Hosts many independently built sites under one process. Each request is
//! resolved against the filesystem to a tenant, then answered by an SSR
//! renderer, a conventional controller, or a static page. In development a
//! per-tenant dev instance is provisioned on demand and its hot-reload
//! socket is multiplexed behind the same listener.

// Core subsystems
pub mod config;
pub mod dispatch;
pub mod http;
pub mod project;
pub mod routing;

// Development multiplexer
pub mod dev;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
