//! Reelcraft Assembly
//!
//! Turns heterogeneous footage, a narration track, optional background
//! music and timed captions into one finished video.
//!
//! # Pipeline
//!
//! ```text
//! materials ──► normalize ──► sub-clips (temp_clips/clip_*.mp4)
//!                                 │
//!                                 ├── schedule (sequential | random)
//!                                 ▼
//!                      merge (disk-batched + transitions)
//!                                 │
//! narration ──┐                   ▼
//! bgm ────────┴──────────► sync (repeat/truncate, mix)
//!                                 │
//! cues ───────► subtitle layout ──┤
//!                                 ▼
//!                       final encode ──► output.mp4 + report.json
//! ```

pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod schedule;
pub mod subtitle;
pub mod sync;
pub mod transition;

pub use pipeline::*;
