//! OpenSASE Common - Shared types for the classification stage
//!
//! This crate provides the primitives every classifier crate agrees on:
//! - Output gate identifiers and the shared default-gate cell
//! - Lock-free counters for per-stage statistics
//! - Error handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod gate;

pub use error::*;
pub use gate::*;

use std::sync::atomic::{AtomicU64, Ordering};

/// High-performance counter for lock-free metrics
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create new counter
    pub const fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// Increment and return previous value
    #[inline(always)]
    pub fn inc(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Add value and return previous
    #[inline(always)]
    pub fn add(&self, val: u64) -> u64 {
        self.0.fetch_add(val, Ordering::Relaxed)
    }

    /// Get current value
    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
