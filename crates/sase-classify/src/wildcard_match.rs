//! Wildcard classifier module
//!
//! Same shape as [`ExactMatch`](crate::ExactMatch) but every rule carries its
//! own per-field masks and a priority.

use tracing::{debug, info, warn};

use sase_common::{DefaultGate, GateId, SaseError, SaseResult};

use crate::config::{
    entries_or_default, SetDefaultGateArg, WildcardMatchArg, WildcardMatchCommandAddArg,
    WildcardMatchCommandDeleteArg, WildcardMatchConfig,
};
use crate::field::{FieldData, FieldLayout};
use crate::key::Key;
use crate::packet::{AttributeRegistry, Packet};
use crate::stage::{self, BatchOutcome, Classifier};
use crate::wildcard::WildcardMatchTable;

/// Wildcard classifier
pub struct WildcardMatch {
    fields: FieldLayout,
    values: FieldLayout,
    table: WildcardMatchTable,
    default_gate: DefaultGate,
    value_masks_given: bool,
    entries: u32,
}

impl WildcardMatch {
    /// Build from an init argument. The default gate starts as the drop gate.
    pub fn init(arg: &WildcardMatchArg, registry: &dyn AttributeRegistry) -> SaseResult<Self> {
        if !arg.masksv.is_empty() && arg.masksv.len() != arg.values.len() {
            return Err(SaseError::invalid(
                "must provide masksv for all values (or none for a full write)",
            ));
        }

        let mut fields = FieldLayout::new();
        for spec in &arg.fields {
            fields.add(spec, None, registry)?;
        }
        let mut values = FieldLayout::new();
        for (i, spec) in arg.values.iter().enumerate() {
            values.add(spec, arg.masksv.get(i), registry)?;
        }

        info!(
            fields = fields.len(),
            key_size = fields.total_size(),
            values = values.len(),
            "wildcard match initialised"
        );

        Ok(Self {
            fields,
            values,
            table: WildcardMatchTable::new(entries_or_default(arg.entries)),
            default_gate: DefaultGate::default(),
            value_masks_given: !arg.masksv.is_empty(),
            entries: arg.entries,
        })
    }

    /// Underlying table
    pub fn table(&self) -> &WildcardMatchTable {
        &self.table
    }

    /// Match key layout
    pub fn fields(&self) -> &FieldLayout {
        &self.fields
    }

    /// Action value layout
    pub fn values(&self) -> &FieldLayout {
        &self.values
    }

    /// Current default gate
    pub fn default_gate(&self) -> GateId {
        self.default_gate.load()
    }

    /// Argument that would rebuild this module's layout
    pub fn get_initial_arg(&self) -> WildcardMatchArg {
        WildcardMatchArg {
            fields: self.fields.specs(),
            values: self.values.specs(),
            masksv: if self.value_masks_given { self.values.masks() } else { Vec::new() },
            entries: self.entries,
        }
    }

    /// Default gate and every rule, sorted by gate, fields, masks, priority
    pub fn get_runtime_config(&self) -> WildcardMatchConfig {
        let space = self.table.snapshot();
        let mut rules: Vec<WildcardMatchCommandAddArg> = space
            .iter()
            .map(|(mask, key, entry)| WildcardMatchCommandAddArg {
                gate: entry.gate,
                priority: entry.priority,
                fields: self.fields.to_data(key),
                masks: self.fields.to_data(mask),
                values: self.values.to_data(&entry.action),
            })
            .collect();
        rules.sort_by(|a, b| {
            a.gate
                .cmp(&b.gate)
                .then_with(|| FieldData::sort_cmp_list(&a.fields, &b.fields))
                .then_with(|| FieldData::sort_cmp_list(&a.masks, &b.masks))
                .then_with(|| a.priority.cmp(&b.priority))
        });

        WildcardMatchConfig { default_gate: self.default_gate.load(), rules }
    }

    /// Replace the default gate and every rule.
    ///
    /// Not atomic: a failing rule leaves the rules before it installed.
    pub fn set_runtime_config(&self, config: &WildcardMatchConfig) -> SaseResult<()> {
        self.default_gate.store(config.default_gate)?;
        let loaded = self
            .table
            .load(config.rules.iter().map(|rule| self.rule_from(rule)))
            .map_err(|e| {
                warn!(error = %e, "wildcard match runtime config partially applied");
                e
            })?;
        info!(
            default_gate = config.default_gate,
            rules = loaded,
            "wildcard match runtime config applied"
        );
        Ok(())
    }

    fn key_and_mask(&self, fields: &[FieldData], masks: &[FieldData]) -> SaseResult<(Key, Key)> {
        if fields.is_empty() {
            return Err(SaseError::invalid("'fields' must be a list"));
        }
        let key = self.fields.key_from(fields, "fields")?;
        let mask = self.fields.key_from(masks, "masks")?;
        Ok((key, mask))
    }

    fn rule_from(
        &self,
        arg: &WildcardMatchCommandAddArg,
    ) -> SaseResult<(Key, Key, i32, GateId, Key)> {
        let (key, mask) = self.key_and_mask(&arg.fields, &arg.masks)?;
        let mut action = self.values.key_from(&arg.values, "values")?;
        action.mask_with(self.values.mask());
        Ok((key, mask, arg.priority, arg.gate, action))
    }

    /// Install one rule
    pub fn add(&self, arg: &WildcardMatchCommandAddArg) -> SaseResult<()> {
        let (key, mask, priority, gate, action) = self.rule_from(arg)?;
        self.table
            .add_rule(&key, &mask, priority, gate, action)
            .map_err(|e| {
                if matches!(e, SaseError::DuplicateRule) {
                    warn!(?key, ?mask, "wildcard rule already exists");
                }
                e
            })?;
        debug!(?key, ?mask, priority, gate, "wildcard rule added");
        Ok(())
    }

    /// Remove one rule; the mask must equal the one it was added with
    pub fn delete(&self, arg: &WildcardMatchCommandDeleteArg) -> SaseResult<()> {
        let (key, mask) = self.key_and_mask(&arg.fields, &arg.masks)?;
        self.table.delete_rule(&key, &mask)?;
        debug!(?key, ?mask, "wildcard rule deleted");
        Ok(())
    }

    /// Remove every rule
    pub fn clear(&self) {
        self.table.clear();
        info!("wildcard match rules cleared");
    }

    /// Change the gate for unmatched packets
    pub fn set_default_gate(&self, arg: &SetDefaultGateArg) -> SaseResult<()> {
        self.default_gate.store(arg.gate)?;
        info!(gate = arg.gate, "wildcard match default gate set");
        Ok(())
    }
}

impl Classifier for WildcardMatch {
    fn process_batch<P: Packet>(&self, pkts: &mut [P], gates: &mut [GateId]) -> BatchOutcome {
        let default_gate = self.default_gate.load();
        let space = self.table.snapshot();
        stage::drive(&self.fields, &self.values, default_gate, pkts, gates, |keys, out| {
            space.lookup_bulk(keys, out)
        })
    }

    fn describe(&self) -> String {
        format!("{} fields, {} rules", self.fields.len(), self.table.len())
    }
}
