//! Reelcraft Data Model
//!
//! Defines the data contracts shared by the assembly pipeline:
//! - **Materials:** Source footage descriptors (video or still image)
//! - **Sub-clips:** Bounded-duration segments derived from one material
//! - **Composition:** Concatenation/transition modes and target aspect
//! - **Captions:** Timed subtitle cues, placement policy, and font spec
//! - **Job parameters:** Background music and per-job composition knobs
//!
//! This crate is pure data plus parsing. No codec or process I/O.

pub mod caption;
pub mod clip;
pub mod composition;
pub mod error;
pub mod job;
pub mod material;

pub use caption::*;
pub use clip::*;
pub use composition::*;
pub use error::*;
pub use job::*;
pub use material::*;
