//! Whole-mesh passes.
//!
//! - **Clean**: stitch a triangle soup into connected topology ([`clean::clean_and_merge`])
//! - **BSP**: back-to-front face ordering for painter's-algorithm drawing ([`bsp::BspTree`])
//!
//! Long-running passes take a [`Progress`] callback and a [`CancellationToken`].

pub mod bsp;
pub mod clean;
pub mod progress;

pub use bsp::{BspOptions, BspTree};
pub use clean::{clean_and_merge, CleanOptions, CleanReport};
pub use progress::{CancellationToken, Progress};
