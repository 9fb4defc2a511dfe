//! Classification Data Plane
//!
//! Concrete packet buffers and metadata attributes for the classifiers in
//! `sase-classify`, plus the stage that drives them batch by batch.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ClassifierStage                         │
//! │                                                              │
//! │  PacketBatch ──► ExactMatch / WildcardMatch ──► gates[i]     │
//! │   (buffers +        (fields from data or         (DROP_GATE  │
//! │    metadata)         MetadataRegistry slots)      = discard) │
//! │                                                              │
//! │                       StageStats (batches/hits/misses/drops) │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Properties
//!
//! 1. **Run-to-Completion**: one synchronous pass per batch
//! 2. **Order Preserving**: gate `i` belongs to packet `i`
//! 3. **Non-Blocking Reads**: rule updates never stall a batch

#![warn(missing_docs)]

pub mod buffer;
pub mod metadata;
pub mod pipeline;
pub mod stats;

pub use buffer::{PacketBatch, PacketBuffer, METADATA_SIZE};
pub use metadata::MetadataRegistry;
pub use pipeline::{ClassifierStage, Stage};
pub use stats::{StageStats, StageStatsSnapshot};

/// Batch size for packet processing
pub const BATCH_SIZE: usize = sase_classify::MAX_BURST;
