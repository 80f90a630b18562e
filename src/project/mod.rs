//! Project resolution subsystem.
//!
//! # Data Flow
//! ```text
//! pathname
//!     → routing (matching routes, declaration order)
//!     → resolver.rs
//!         ssr:          tenant dir → entry + template exist?
//!         conventional: segmenter → tenant / controller / method
//!                       → controller holder? static page? hidden member?
//!     → ProjectInfo (Ssr | Conventional | Static) or None
//! ```

pub mod info;
pub mod resolver;

pub use info::{ConventionalProject, ProjectInfo, SsrProject, StaticAsset, Tenant};
pub use resolver::ProjectResolver;
