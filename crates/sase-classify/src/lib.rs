//! Packet classification stage
//!
//! Two classifiers that map a key built from selected packet fields to an
//! output gate and an optional value written back into the packet.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      process_batch                            │
//! │                                                               │
//! │  ┌────────────┐      ┌──────────────────┐      ┌───────────┐  │
//! │  │ FieldLayout│─────►│  ExactRules      │─────►│  apply    │  │
//! │  │ build_keys │ keys │  or TupleSpace   │ hits │  values   │  │
//! │  └────────────┘      │  (ArcSwap pinned)│      │  + gates  │  │
//! │                      └──────────────────┘      └───────────┘  │
//! │                              ▲                                │
//! │       add / delete / clear   │ copy, modify, swap             │
//! │  ────────────────────────────┘                                │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups pin a snapshot once per batch and never block. Control-plane
//! writers are serialised per table and publish a new snapshot on success.

#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod exact;
pub mod exact_match;
pub mod field;
pub mod key;
pub mod packet;
pub mod stage;
pub mod wildcard;
pub mod wildcard_match;

#[cfg(test)]
mod properties;

pub use command::{
    find_command, CommandSafety, CommandSpec, EXACT_MATCH_COMMANDS, WILDCARD_MATCH_COMMANDS,
};
pub use config::{
    ExactMatchArg, ExactMatchCommandAddArg, ExactMatchCommandDeleteArg, ExactMatchConfig,
    JsonConfig, SetDefaultGateArg, WildcardMatchArg, WildcardMatchCommandAddArg,
    WildcardMatchCommandDeleteArg, WildcardMatchConfig,
};
pub use exact::{ExactEntry, ExactMatchTable, ExactRules};
pub use exact_match::ExactMatch;
pub use field::{Field, FieldData, FieldLayout, FieldSource, FieldSpec};
pub use key::{Key, HASH_KEY_SIZE, MAX_FIELDS, MAX_FIELD_SIZE};
pub use packet::{AttrId, AttrSlot, AttributeRegistry, Packet};
pub use stage::{BatchOutcome, Classifier, Hit, MAX_BULK, MAX_BURST};
pub use wildcard::{Tuple, TupleSpace, WildcardEntry, WildcardMatchTable, MAX_TUPLES};
pub use wildcard_match::WildcardMatch;
