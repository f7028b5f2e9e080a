//! Reelcraft Codec
//!
//! The codec collaborator the assembly pipeline drives. Compositions are
//! built as nodes in a handle graph and only touch pixels when encoded.
//!
//! ```text
//! open_video / open_image / open_audio ──► MediaGraph (arena of handles)
//!                                              │
//!          subclip, resize, letterbox, zoom,   │
//!          fades, slides, concat, composite,   │
//!          volume, loop, mix, set_audio ───────┤
//!                                              ▼
//!                                   CodecBackend::encode
//!                                    ├── ffmpeg (filter_complex)
//!                                    └── manifest (JSON, tests/planning)
//!                                              │
//!                                              ▼
//!                                   reclaim::release (visited set)
//! ```

pub mod codec;
pub mod ffmpeg;
pub mod filter;
pub mod graph;
pub mod manifest;
pub mod reclaim;

pub use codec::*;
pub use ffmpeg::{command_exists, FfmpegBackend};
pub use graph::*;
pub use manifest::{read_manifest, write_manifest, ManifestBackend, ManifestSegment, MediaManifest};
pub use reclaim::{release, release_all, ReleaseStats};
