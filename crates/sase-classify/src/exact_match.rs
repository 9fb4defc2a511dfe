//! Exact-match classifier module
//!
//! Owns an [`ExactMatchTable`], the action value layout and the default gate,
//! and translates control-plane commands into table operations.

use tracing::{debug, info, warn};

use sase_common::{DefaultGate, GateId, SaseError, SaseResult};

use crate::config::{
    entries_or_default, ExactMatchArg, ExactMatchCommandAddArg, ExactMatchCommandDeleteArg,
    ExactMatchConfig, SetDefaultGateArg,
};
use crate::exact::ExactMatchTable;
use crate::field::{FieldData, FieldLayout};
use crate::key::Key;
use crate::packet::{AttributeRegistry, Packet};
use crate::stage::{self, BatchOutcome, Classifier};

fn check_masks(given: usize, fields: usize, what: &str) -> SaseResult<()> {
    if given != 0 && given != fields {
        return Err(SaseError::invalid(format!(
            "must provide {what} for all fields (or none for a full match)"
        )));
    }
    Ok(())
}

/// Exact-match classifier
pub struct ExactMatch {
    table: ExactMatchTable,
    values: FieldLayout,
    default_gate: DefaultGate,
    masks_given: bool,
    value_masks_given: bool,
    entries: u32,
}

impl ExactMatch {
    /// Build from an init argument. The default gate starts as the drop gate.
    pub fn init(arg: &ExactMatchArg, registry: &dyn AttributeRegistry) -> SaseResult<Self> {
        check_masks(arg.masks.len(), arg.fields.len(), "masks")?;
        check_masks(arg.masksv.len(), arg.values.len(), "masksv")?;

        let mut table = ExactMatchTable::new(entries_or_default(arg.entries));
        for (i, spec) in arg.fields.iter().enumerate() {
            table.add_field(spec, arg.masks.get(i), registry)?;
        }

        let mut values = FieldLayout::new();
        for (i, spec) in arg.values.iter().enumerate() {
            values.add(spec, arg.masksv.get(i), registry)?;
        }

        info!(
            fields = table.layout().len(),
            key_size = table.layout().total_size(),
            values = values.len(),
            "exact match initialised"
        );

        Ok(Self {
            table,
            values,
            default_gate: DefaultGate::default(),
            masks_given: !arg.masks.is_empty(),
            value_masks_given: !arg.masksv.is_empty(),
            entries: arg.entries,
        })
    }

    /// Underlying table
    pub fn table(&self) -> &ExactMatchTable {
        &self.table
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
    pub fn get_initial_arg(&self) -> ExactMatchArg {
        let layout = self.table.layout();
        ExactMatchArg {
            fields: layout.specs(),
            masks: if self.masks_given { layout.masks() } else { Vec::new() },
            values: self.values.specs(),
            masksv: if self.value_masks_given { self.values.masks() } else { Vec::new() },
            entries: self.entries,
        }
    }

    /// Default gate and every rule, sorted by gate then field values
    pub fn get_runtime_config(&self) -> ExactMatchConfig {
        let layout = self.table.layout();
        let rules = self.table.snapshot();
        let mut out: Vec<ExactMatchCommandAddArg> = rules
            .iter()
            .map(|(key, entry)| ExactMatchCommandAddArg {
                gate: entry.gate,
                fields: layout.to_data(key),
                values: self.values.to_data(&entry.action),
            })
            .collect();
        out.sort_by(|a, b| {
            a.gate
                .cmp(&b.gate)
                .then_with(|| FieldData::sort_cmp_list(&a.fields, &b.fields))
        });

        ExactMatchConfig { default_gate: self.default_gate.load(), rules: out }
    }

    /// Replace the default gate and every rule.
    ///
    /// Not atomic: a failing rule leaves the rules before it installed.
    pub fn set_runtime_config(&self, config: &ExactMatchConfig) -> SaseResult<()> {
        self.default_gate.store(config.default_gate)?;
        let loaded = self
            .table
            .load(config.rules.iter().map(|rule| self.rule_from(rule)))
            .map_err(|e| {
                warn!(error = %e, "exact match runtime config partially applied");
                e
            })?;
        info!(
            default_gate = config.default_gate,
            rules = loaded,
            "exact match runtime config applied"
        );
        Ok(())
    }

    fn rule_from(&self, arg: &ExactMatchCommandAddArg) -> SaseResult<(Key, GateId, Key)> {
        if arg.fields.is_empty() {
            return Err(SaseError::invalid("'fields' must be a list"));
        }
        let key = self.table.layout().key_from(&arg.fields, "fields")?;
        let mut action = self.values.key_from(&arg.values, "values")?;
        action.mask_with(self.values.mask());
        Ok((key, arg.gate, action))
    }

    /// Install one rule
    pub fn add(&self, arg: &ExactMatchCommandAddArg) -> SaseResult<()> {
        let (key, gate, action) = self.rule_from(arg)?;
        self.table.add_rule(&key, gate, action).map_err(|e| {
            if matches!(e, SaseError::DuplicateRule) {
                warn!(?key, "exact rule already exists");
            }
            e
        })?;
        debug!(?key, gate, "exact rule added");
        Ok(())
    }

    /// Remove one rule
    pub fn delete(&self, arg: &ExactMatchCommandDeleteArg) -> SaseResult<()> {
        if arg.fields.is_empty() {
            return Err(SaseError::invalid("'fields' must be a list"));
        }
        let key = self.table.layout().key_from(&arg.fields, "fields")?;
        self.table.delete_rule(&key)?;
        debug!(?key, "exact rule deleted");
        Ok(())
    }

    /// Remove every rule
    pub fn clear(&self) {
        self.table.clear();
        info!("exact match rules cleared");
    }

    /// Change the gate for unmatched packets
    pub fn set_default_gate(&self, arg: &SetDefaultGateArg) -> SaseResult<()> {
        self.default_gate.store(arg.gate)?;
        info!(gate = arg.gate, "exact match default gate set");
        Ok(())
    }
}

impl Classifier for ExactMatch {
    fn process_batch<P: Packet>(&self, pkts: &mut [P], gates: &mut [GateId]) -> BatchOutcome {
        let default_gate = self.default_gate.load();
        let rules = self.table.snapshot();
        stage::drive(self.table.layout(), &self.values, default_gate, pkts, gates, |keys, out| {
            rules.find_bulk(keys, out)
        })
    }

    fn describe(&self) -> String {
        format!("{} fields, {} rules", self.table.layout().len(), self.table.len())
    }
}
