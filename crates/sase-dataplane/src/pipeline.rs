//! Classifier Stage
//!
//! RX batch → ExtractKeys → Lookup → ApplyActions → per-packet gates
//!
//! The stage never drops or reorders packets itself. It fills one gate per
//! packet; the caller forwards each packet on its gate (`DROP_GATE` = discard).

use tracing::info;

use sase_classify::Classifier;
use sase_common::{GateId, DROP_GATE};

use crate::buffer::PacketBatch;
use crate::stats::{StageStats, StageStatsSnapshot};

/// Batch-oriented pipeline stage
pub trait Stage: Send + Sync {
    /// Process `batch`, leaving one gate per packet in `gates` (batch order)
    fn process_batch(&self, batch: &mut PacketBatch<'_>, gates: &mut Vec<GateId>);
    /// Instance name
    fn name(&self) -> &str;
}

/// Stage wrapping an exact or wildcard classifier
pub struct ClassifierStage<C> {
    name: String,
    classifier: C,
    stats: StageStats,
}

impl<C: Classifier> ClassifierStage<C> {
    /// Wrap a configured classifier
    pub fn new(name: impl Into<String>, classifier: C) -> Self {
        let name = name.into();
        info!(stage = %name, desc = %classifier.describe(), "classifier stage created");
        Self { name, classifier, stats: StageStats::default() }
    }

    /// Underlying classifier, for control-plane commands
    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Counter snapshot
    pub fn stats(&self) -> StageStatsSnapshot {
        self.stats.snapshot()
    }
}

impl<C: Classifier> Stage for ClassifierStage<C> {
    #[inline]
    fn process_batch(&self, batch: &mut PacketBatch<'_>, gates: &mut Vec<GateId>) {
        gates.clear();
        gates.resize(batch.len(), DROP_GATE);

        let outcome = self.classifier.process_batch(batch.as_mut_slice(), gates);
        let dropped = gates.iter().filter(|&&g| g == DROP_GATE).count();
        self.stats.record_batch(outcome, dropped);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PacketBuffer;
    use crate::metadata::MetadataRegistry;
    use sase_classify::{
        ExactMatch, ExactMatchArg, ExactMatchCommandAddArg, FieldData, FieldSpec, Packet,
        SetDefaultGateArg, WildcardMatch, WildcardMatchArg, WildcardMatchCommandAddArg,
        MAX_BURST,
    };

    fn eth_ipv4(dst: [u8; 4], vlan_meta: u16) -> PacketBuffer {
        let mut frame = [0u8; 64];
        frame[12..14].copy_from_slice(&0x0800u16.to_be_bytes());
        frame[30..34].copy_from_slice(&dst);
        let mut buf = PacketBuffer::from_slice(&frame).unwrap();
        buf.metadata_mut()[..2].copy_from_slice(&vlan_meta.to_le_bytes());
        buf
    }

    #[test]
    fn test_exact_stage_routes_and_rewrites() {
        let reg = MetadataRegistry::new();
        reg.register("vlan", 2).unwrap();
        reg.register("out_tag", 4).unwrap();

        let em = ExactMatch::init(
            &ExactMatchArg {
                fields: vec![FieldSpec::offset(30, 4), FieldSpec::attr("vlan", 2)],
                values: vec![FieldSpec::attr("out_tag", 4), FieldSpec::offset(0, 1)],
                ..Default::default()
            },
            &reg,
        )
        .unwrap();
        em.add(&ExactMatchCommandAddArg {
            gate: 1,
            fields: vec![FieldData::ValueInt(0x0A00_0001), FieldData::ValueInt(100)],
            values: vec![FieldData::ValueInt(42), FieldData::ValueInt(0xEE)],
        })
        .unwrap();
        em.set_default_gate(&SetDefaultGateArg { gate: 2 }).unwrap();
        let stage = ClassifierStage::new("em0", em);

        let mut hit = eth_ipv4([10, 0, 0, 1], 100);
        let mut other_vlan = eth_ipv4([10, 0, 0, 1], 200);
        let mut miss = eth_ipv4([10, 0, 0, 2], 100);
        let untouched = miss.data().to_vec();

        let mut batch: PacketBatch<'_> =
            [&mut hit, &mut other_vlan, &mut miss].into_iter().collect();
        let mut gates = Vec::new();
        stage.process_batch(&mut batch, &mut gates);
        drop(batch);

        assert_eq!(gates, vec![1, 2, 2]);
        assert_eq!(&hit.metadata()[2..6], &42u32.to_le_bytes());
        assert_eq!(hit.data()[0], 0xEE);
        assert_eq!(miss.data(), &untouched[..]);
        assert_eq!(&miss.metadata()[2..6], &[0; 4]);

        let stats = stage.stats();
        assert_eq!((stats.hits, stats.misses, stats.dropped), (1, 2, 0));
        assert_eq!(stage.name(), "em0");
    }

    #[test]
    fn test_wildcard_stage_counts_drops() {
        let reg = MetadataRegistry::new();
        let wm = WildcardMatch::init(
            &WildcardMatchArg { fields: vec![FieldSpec::offset(30, 4)], ..Default::default() },
            &reg,
        )
        .unwrap();
        wm.add(&WildcardMatchCommandAddArg {
            gate: 3,
            priority: 1,
            fields: vec![FieldData::ValueInt(0x0A00_0000)],
            masks: vec![FieldData::ValueInt(0xFF00_0000)],
            values: vec![],
        })
        .unwrap();
        let stage = ClassifierStage::new("wm0", wm);

        let mut bufs: Vec<PacketBuffer> = (0..MAX_BURST as u8)
            .map(|i| eth_ipv4([if i % 2 == 0 { 10 } else { 11 }, 0, 0, i], 0))
            .collect();
        let mut batch: PacketBatch<'_> = bufs.iter_mut().collect();
        let mut gates = vec![7; 3];
        stage.process_batch(&mut batch, &mut gates);

        assert_eq!(gates.len(), MAX_BURST);
        for (i, g) in gates.iter().enumerate() {
            assert_eq!(*g, if i % 2 == 0 { 3 } else { DROP_GATE });
        }
        let stats = stage.stats();
        assert_eq!(stats.packets, MAX_BURST as u64);
        assert_eq!(stats.dropped, MAX_BURST as u64 / 2);
        assert_eq!(stage.classifier().describe(), "1 fields, 1 rules");
    }

    #[test]
    fn test_short_packet_value_write_skipped() {
        let reg = MetadataRegistry::new();
        let em = ExactMatch::init(
            &ExactMatchArg {
                fields: vec![FieldSpec::offset(0, 1)],
                values: vec![FieldSpec::offset(4, 2)],
                ..Default::default()
            },
            &reg,
        )
        .unwrap();
        em.add(&ExactMatchCommandAddArg {
            gate: 0,
            fields: vec![FieldData::ValueInt(1)],
            values: vec![FieldData::ValueInt(0xBEEF)],
        })
        .unwrap();
        let stage = ClassifierStage::new("em1", em);

        let mut short = PacketBuffer::from_slice(&[1, 2, 3, 4, 5]).unwrap();
        let mut long = PacketBuffer::from_slice(&[1, 2, 3, 4, 5, 6]).unwrap();
        let mut batch: PacketBatch<'_> = [&mut short, &mut long].into_iter().collect();
        let mut gates = Vec::new();
        stage.process_batch(&mut batch, &mut gates);
        drop(batch);

        assert_eq!(gates, vec![0, 0]);
        assert_eq!(short.data(), &[1, 2, 3, 4, 5]);
        assert_eq!(long.data(), &[1, 2, 3, 4, 0xBE, 0xEF]);
    }
}
