//! Control-plane command tables
//!
//! Commands marked [`CommandSafety::ThreadSafe`] may run while the stage is
//! classifying. The rest need the caller to quiesce the stage first.

/// Whether a command may run concurrently with packet processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSafety {
    /// Runs alongside the dataplane
    ThreadSafe,
    /// Requires the stage to be paused
    ThreadUnsafe,
}

/// Name, argument type and safety of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// Command name
    pub name: &'static str,
    /// Argument type name
    pub arg: &'static str,
    /// Concurrency class
    pub safety: CommandSafety,
}

const fn cmd(name: &'static str, arg: &'static str, safety: CommandSafety) -> CommandSpec {
    CommandSpec { name, arg, safety }
}

/// Commands accepted by [`ExactMatch`](crate::ExactMatch)
pub const EXACT_MATCH_COMMANDS: &[CommandSpec] = &[
    cmd("get_initial_arg", "EmptyArg", CommandSafety::ThreadSafe),
    cmd("get_runtime_config", "EmptyArg", CommandSafety::ThreadSafe),
    cmd("set_runtime_config", "ExactMatchConfig", CommandSafety::ThreadUnsafe),
    cmd("add", "ExactMatchCommandAddArg", CommandSafety::ThreadSafe),
    cmd("delete", "ExactMatchCommandDeleteArg", CommandSafety::ThreadSafe),
    cmd("clear", "EmptyArg", CommandSafety::ThreadSafe),
    cmd("set_default_gate", "SetDefaultGateArg", CommandSafety::ThreadSafe),
];

/// Commands accepted by [`WildcardMatch`](crate::WildcardMatch)
pub const WILDCARD_MATCH_COMMANDS: &[CommandSpec] = &[
    cmd("get_initial_arg", "EmptyArg", CommandSafety::ThreadSafe),
    cmd("get_runtime_config", "EmptyArg", CommandSafety::ThreadSafe),
    cmd("set_runtime_config", "WildcardMatchConfig", CommandSafety::ThreadUnsafe),
    cmd("add", "WildcardMatchCommandAddArg", CommandSafety::ThreadSafe),
    cmd("delete", "WildcardMatchCommandDeleteArg", CommandSafety::ThreadSafe),
    cmd("clear", "EmptyArg", CommandSafety::ThreadSafe),
    cmd("set_default_gate", "SetDefaultGateArg", CommandSafety::ThreadSafe),
];

/// Look a command up by name
pub fn find_command(table: &[CommandSpec], name: &str) -> Option<CommandSpec> {
    table.iter().find(|c| c.name == name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_set_runtime_config_is_unsafe() {
        for table in [EXACT_MATCH_COMMANDS, WILDCARD_MATCH_COMMANDS] {
            let unsafe_cmds: Vec<_> = table
                .iter()
                .filter(|c| c.safety == CommandSafety::ThreadUnsafe)
                .map(|c| c.name)
                .collect();
            assert_eq!(unsafe_cmds, ["set_runtime_config"]);
        }
    }

    #[test]
    fn test_find_command() {
        let add = find_command(WILDCARD_MATCH_COMMANDS, "add").unwrap();
        assert_eq!(add.arg, "WildcardMatchCommandAddArg");
        assert!(find_command(EXACT_MATCH_COMMANDS, "flush").is_none());
    }
}
