//! Command catalog shared by the parser, the executor, and `help`.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Relay,
    Burst,
    Stats,
    Status,
    Help,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub usage: &'static str,
    pub summary: &'static str,
}

static COMMANDS: [CommandSpec; 5] = [
    CommandSpec {
        name: "relay",
        tag: CommandTag::Relay,
        usage: "relay on|off [now]",
        summary: "switch the relay at the next zero crossing (`now` switches immediately)",
    },
    CommandSpec {
        name: "burst",
        tag: CommandTag::Burst,
        usage: "burst duty=<0-20> | burst off",
        summary: "conduct for <duty> of every 20 half cycles",
    },
    CommandSpec {
        name: "stats",
        tag: CommandTag::Stats,
        usage: "stats [reset]",
        summary: "show or clear the edge and toggle counters",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        usage: "status",
        summary: "show relay, mains lock, and counter state",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        usage: "help [command]",
        summary: "list commands or describe one",
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let spec = find("RELAY").expect("relay command");
        assert_eq!(spec.tag, CommandTag::Relay);
        assert!(find("reboot").is_none());
    }

    #[test]
    fn every_command_documents_its_usage() {
        for spec in commands() {
            assert!(spec.usage.starts_with(spec.name));
        }
    }
}
