//! Previz Engine - the lazy compositing core
//!
//! A user script builds a declarative pipeline of clips; nothing is
//! rendered until a frame is requested. This crate holds the three
//! subsystems that make re-running such scripts cheap:
//!
//! - the composition DAG and the structural identity of its nodes, so
//!   equivalent subgraphs across sessions coalesce onto one cache entry;
//! - the canonical-order rewrite rules and concat flattening, so small
//!   script edits perturb the graph minimally;
//! - the priority-driven frame cache with its pluggable eviction policies.

pub mod cache;
pub mod graph;
pub mod meta;
pub mod node;
pub mod ops;
pub mod reader;
pub mod testing;

pub use cache::{CacheAlgorithm, CacheEntry, FrameCache};
pub use graph::{CompositionGraph, GraphHandle};
pub use meta::ClipMeta;
pub use node::{Clip, ClipKind, Source};
pub use ops::load::load;
pub use ops::text::{text, TextStyle};
pub use ops::{
    CompositePlacement, CropRegion, KernelSize, ResizeTarget, SlideSpec, SpeedTarget,
    SubclipRange,
};
pub use reader::{FrameReader, ReaderFactory};
