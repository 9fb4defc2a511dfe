//! Batch driver shared by both classifiers
//!
//! ExtractKeys → Lookup → ApplyActions+Route, synchronously, in packet order.

use sase_common::GateId;

use crate::field::FieldLayout;
use crate::key::Key;
use crate::packet::Packet;

/// Keys resolved per bulk lookup (width of the hit mask)
pub const MAX_BULK: usize = 64;

/// Nominal packets per batch handed to a stage
pub const MAX_BURST: usize = 32;

/// A matched rule as seen by the batch driver
#[derive(Debug, Clone, Copy)]
pub struct Hit<'a> {
    /// Output gate
    pub gate: GateId,
    /// Value to write back
    pub action: &'a Key,
}

/// Per-batch hit/miss tally
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Packets that matched a rule
    pub hits: usize,
    /// Packets routed to the default gate
    pub misses: usize,
}

/// A classifier the dataplane can drive batches through
pub trait Classifier: Send + Sync {
    /// Classify `pkts`, rewriting matched packets and writing each packet's
    /// gate to the same index of `gates`.
    ///
    /// # Panics
    /// If `pkts` and `gates` differ in length.
    fn process_batch<P: Packet>(&self, pkts: &mut [P], gates: &mut [GateId]) -> BatchOutcome;

    /// One-line human description
    fn describe(&self) -> String;
}

/// Run one batch against a pinned table snapshot.
///
/// `lookup` fills one result per key and returns the hit mask. `default_gate`
/// must already be the value read once for this batch.
pub(crate) fn drive<'a, P: Packet>(
    fields: &FieldLayout,
    values: &FieldLayout,
    default_gate: GateId,
    pkts: &mut [P],
    gates: &mut [GateId],
    mut lookup: impl FnMut(&[Key], &mut [Option<Hit<'a>>]) -> u64,
) -> BatchOutcome {
    assert_eq!(pkts.len(), gates.len(), "one gate slot per packet");

    let mut keys = [Key::ZERO; MAX_BULK];
    let mut results: [Option<Hit<'a>>; MAX_BULK] = [None; MAX_BULK];
    let mut outcome = BatchOutcome::default();

    for (pkts, gates) in pkts.chunks_mut(MAX_BULK).zip(gates.chunks_mut(MAX_BULK)) {
        let n = pkts.len();
        fields.build_keys(pkts, &mut keys[..n]);
        let hit_mask = lookup(&keys[..n], &mut results[..n]);

        for (j, (pkt, gate)) in pkts.iter_mut().zip(gates.iter_mut()).enumerate() {
            match results[j].filter(|_| hit_mask & (1u64 << j) != 0) {
                Some(hit) => {
                    values.apply(pkt, hit.action);
                    *gate = hit.gate;
                    outcome.hits += 1;
                }
                None => {
                    *gate = default_gate;
                    outcome.misses += 1;
                }
            }
        }
    }
    outcome
}
