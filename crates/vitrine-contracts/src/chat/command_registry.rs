#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandKind {
    Help,
    Quit,
    AddReferences,
    RemoveReference,
    ListReferences,
    ClearCanvas,
    SetPrompt,
    AutoPrompt,
    Generate,
    SetSetting,
    ShowSettings,
    ShowSwatches,
    ShowLatest,
    ShowHistory,
    Save,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub kind: CommandKind,
}

pub(crate) const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        kind: CommandKind::Help,
    },
    CommandSpec {
        command: "quit",
        kind: CommandKind::Quit,
    },
    CommandSpec {
        command: "exit",
        kind: CommandKind::Quit,
    },
    CommandSpec {
        command: "add",
        kind: CommandKind::AddReferences,
    },
    CommandSpec {
        command: "remove",
        kind: CommandKind::RemoveReference,
    },
    CommandSpec {
        command: "refs",
        kind: CommandKind::ListReferences,
    },
    CommandSpec {
        command: "clear",
        kind: CommandKind::ClearCanvas,
    },
    CommandSpec {
        command: "prompt",
        kind: CommandKind::SetPrompt,
    },
    CommandSpec {
        command: "auto",
        kind: CommandKind::AutoPrompt,
    },
    CommandSpec {
        command: "generate",
        kind: CommandKind::Generate,
    },
    CommandSpec {
        command: "set",
        kind: CommandKind::SetSetting,
    },
    CommandSpec {
        command: "settings",
        kind: CommandKind::ShowSettings,
    },
    CommandSpec {
        command: "swatches",
        kind: CommandKind::ShowSwatches,
    },
    CommandSpec {
        command: "latest",
        kind: CommandKind::ShowLatest,
    },
    CommandSpec {
        command: "history",
        kind: CommandKind::ShowHistory,
    },
    CommandSpec {
        command: "save",
        kind: CommandKind::Save,
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/add <paths...>",
    "/remove <id>",
    "/refs",
    "/clear",
    "/prompt <text>",
    "/auto",
    "/generate",
    "/set <key> <value>",
    "/settings",
    "/swatches",
    "/latest",
    "/history",
    "/save",
    "/help",
    "/quit",
];

pub(crate) fn find_kind(command: &str) -> Option<CommandKind> {
    COMMANDS
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.kind)
}
