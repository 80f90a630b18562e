//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming pathname
//!     → router.rs (ordered route lookup)
//!     → matcher.rs (segment-boundary prefix test)
//!     → Return: matched Route(s) or NoMatch
//!
//! Conventional routes only:
//!     pathname minus route base
//!     → segmenter.rs (probe directories under the route root)
//!     → (dirs, next, tail)
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Compile matchers
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod router;
pub mod segmenter;

pub use matcher::{Matcher, SegmentPrefixMatcher};
pub use router::{Route, RouteTable};
pub use segmenter::{segment, split_path, Segments};
