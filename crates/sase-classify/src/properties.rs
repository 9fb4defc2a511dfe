//! Cross-module properties: masking, bulk/single agreement, concurrent access

use proptest::prelude::*;

use sase_common::{GateId, DROP_GATE};

use crate::config::*;
use crate::exact_match::ExactMatch;
use crate::field::{FieldData, FieldSpec};
use crate::key::Key;
use crate::packet::testutil::{TestPacket, TestRegistry};
use crate::stage::{Classifier, MAX_BULK};
use crate::wildcard_match::WildcardMatch;

fn exact(mask: Option<u32>) -> ExactMatch {
    let arg = ExactMatchArg {
        fields: vec![FieldSpec::offset(0, 4)],
        masks: mask.map(|m| vec![FieldData::ValueInt(m as u64)]).unwrap_or_default(),
        ..Default::default()
    };
    ExactMatch::init(&arg, &TestRegistry::default()).unwrap()
}

fn gate_of<C: Classifier>(c: &C, data: [u8; 4]) -> GateId {
    let mut pkts = [TestPacket::new(&data)];
    let mut gates = [0];
    c.process_batch(&mut pkts, &mut gates);
    gates[0]
}

proptest! {
    #[test]
    fn masked_out_bits_never_matter(key: u32, noise: u32, mask: u32) {
        prop_assume!(mask != 0);
        let em = exact(Some(mask));
        em.add(&ExactMatchCommandAddArg {
            gate: 1,
            fields: vec![FieldData::ValueInt(key as u64)],
            values: vec![],
        }).unwrap();

        let data = (key & mask) | (noise & !mask);
        prop_assert_eq!(gate_of(&em, data.to_be_bytes()), 1);
    }

    #[test]
    fn full_mask_is_exact(key: u32, other: u32) {
        let em = exact(None);
        em.add(&ExactMatchCommandAddArg {
            gate: 1,
            fields: vec![FieldData::ValueInt(key as u64)],
            values: vec![],
        }).unwrap();

        let expected = if other == key { 1 } else { DROP_GATE };
        prop_assert_eq!(gate_of(&em, other.to_be_bytes()), expected);
    }

    #[test]
    fn batch_agrees_with_single_lookup(
        rules in prop::collection::vec((any::<u16>(), 0u16..4, -5i32..5, 0u16..16), 1..24),
        inputs in prop::collection::vec(any::<u16>(), 1..(2 * MAX_BULK + 7)),
    ) {
        let wm = WildcardMatch::init(
            &WildcardMatchArg { fields: vec![FieldSpec::offset(0, 2)], ..Default::default() },
            &TestRegistry::default(),
        ).unwrap();
        let masks = [0xFF00u64, 0xFFF0, 0xFFFF, 0x00FF];
        for (value, m, priority, gate) in rules {
            // Duplicates are rejected and simply skipped.
            let _ = wm.add(&WildcardMatchCommandAddArg {
                gate,
                priority,
                fields: vec![FieldData::ValueInt(value as u64)],
                masks: vec![FieldData::ValueInt(masks[m as usize])],
                values: vec![],
            });
        }

        let mut pkts: Vec<_> = inputs.iter().map(|p| TestPacket::new(&p.to_be_bytes())).collect();
        let mut gates = vec![0; pkts.len()];
        wm.process_batch(&mut pkts, &mut gates);

        for (p, gate) in inputs.iter().zip(&gates) {
            let single = wm
                .table()
                .lookup(&Key::from_prefix(&p.to_be_bytes()))
                .map_or(DROP_GATE, |e| e.gate);
            prop_assert_eq!(*gate, single);
        }
    }
}

#[test]
fn concurrent_updates_and_lookups() {
    let em = exact(None);
    em.set_default_gate(&SetDefaultGateArg { gate: 0 }).unwrap();
    let stable = 0x0A00_0001u64;
    em.add(&ExactMatchCommandAddArg {
        gate: 1,
        fields: vec![FieldData::ValueInt(stable)],
        values: vec![],
    })
    .unwrap();

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..500u64 {
                let rule = ExactMatchCommandAddArg {
                    gate: 2,
                    fields: vec![FieldData::ValueInt(0x0B00_0000 + i)],
                    values: vec![],
                };
                em.add(&rule).unwrap();
                if i % 2 == 0 {
                    em.delete(&ExactMatchCommandDeleteArg { fields: rule.fields }).unwrap();
                }
            }
        });

        for _ in 0..4 {
            s.spawn(|| {
                for i in 0..500u32 {
                    let mut pkts = [
                        TestPacket::new(&0x0A00_0001u32.to_be_bytes()),
                        TestPacket::new(&(0x0B00_0000 + i).to_be_bytes()),
                        TestPacket::new(&0x0C00_0000u32.to_be_bytes()),
                    ];
                    let mut gates = [GateId::MAX; 3];
                    em.process_batch(&mut pkts, &mut gates);
                    assert_eq!(gates[0], 1);
                    assert!(gates[1] == 0 || gates[1] == 2);
                    assert_eq!(gates[2], 0);
                }
            });
        }
    });

    assert_eq!(em.table().len(), 1 + 250);
}

#[test]
fn concurrent_wildcard_updates_and_lookups() {
    let wm = WildcardMatch::init(
        &WildcardMatchArg { fields: vec![FieldSpec::offset(0, 4)], ..Default::default() },
        &TestRegistry::default(),
    )
    .unwrap();
    wm.set_default_gate(&SetDefaultGateArg { gate: 0 }).unwrap();
    wm.add(&WildcardMatchCommandAddArg {
        gate: 1,
        priority: 0,
        fields: vec![FieldData::ValueInt(0x0A00_0001)],
        masks: vec![FieldData::ValueInt(0xFFFF_FFFF)],
        values: vec![],
    })
    .unwrap();

    // Each mask gets its own tuple, created on add and freed on delete.
    let masks = [0xFF00_0000u64, 0xFFFF_0000, 0xFFFF_FF00];
    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..600u64 {
                let rule = WildcardMatchCommandAddArg {
                    gate: 2,
                    priority: 1,
                    fields: vec![FieldData::ValueInt(0x0B00_0000 + ((i % 256) << 8))],
                    masks: vec![FieldData::ValueInt(masks[i as usize % masks.len()])],
                    values: vec![],
                };
                wm.add(&rule).unwrap();
                assert!(wm.table().num_tuples() <= 2);
                wm.delete(&WildcardMatchCommandDeleteArg {
                    fields: rule.fields,
                    masks: rule.masks,
                })
                .unwrap();
            }
        });

        for _ in 0..4 {
            s.spawn(|| {
                for i in 0..600u32 {
                    let mut pkts = [
                        TestPacket::new(&0x0A00_0001u32.to_be_bytes()),
                        TestPacket::new(&(0x0B00_0000 + ((i % 256) << 8)).to_be_bytes()),
                        TestPacket::new(&0x0C00_0000u32.to_be_bytes()),
                    ];
                    let mut gates = [GateId::MAX; 3];
                    wm.process_batch(&mut pkts, &mut gates);
                    assert_eq!(gates[0], 1);
                    assert!(gates[1] == 0 || gates[1] == 2);
                    assert_eq!(gates[2], 0);
                }
            });
        }
    });

    assert_eq!(wm.table().len(), 1);
    assert_eq!(wm.table().num_tuples(), 1);
}
