//! Output gates
//!
//! A gate is the index of the downstream path a packet leaves through.
//! `DROP_GATE` is a reserved sentinel just past the last real gate.

use std::sync::atomic::{AtomicU16, Ordering};

use crate::{SaseError, SaseResult};

/// Output gate index
pub type GateId = u16;

/// Number of real output gates
pub const MAX_GATES: GateId = 8192;

/// Sentinel gate: packets routed here are discarded
pub const DROP_GATE: GateId = MAX_GATES;

/// Whether `gate` is a real output or the drop sentinel.
#[inline(always)]
pub const fn is_valid_gate(gate: GateId) -> bool {
    gate < MAX_GATES || gate == DROP_GATE
}

/// Reject gates outside `0..MAX_GATES` that are not `DROP_GATE`.
#[inline]
pub fn check_gate(gate: GateId) -> SaseResult<GateId> {
    if is_valid_gate(gate) {
        Ok(gate)
    } else {
        Err(SaseError::InvalidGate(gate))
    }
}

/// Default route shared between the control path and the data path.
///
/// Stored as a single atomic word. The data path reads it once per batch, so
/// a change made mid-batch takes effect from the next batch.
#[derive(Debug)]
pub struct DefaultGate(AtomicU16);

impl DefaultGate {
    /// Create a cell holding `gate`
    pub const fn new(gate: GateId) -> Self {
        Self(AtomicU16::new(gate))
    }

    /// Current default gate
    #[inline(always)]
    pub fn load(&self) -> GateId {
        self.0.load(Ordering::Acquire)
    }

    /// Validate and publish a new default gate
    pub fn store(&self, gate: GateId) -> SaseResult<()> {
        self.0.store(check_gate(gate)?, Ordering::Release);
        Ok(())
    }
}

impl Default for DefaultGate {
    fn default() -> Self {
        Self::new(DROP_GATE)
    }
}
