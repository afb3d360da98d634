use super::command_registry::{find_kind, CommandKind};

/// One line of chat input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Noop,
    Help,
    Quit,
    AddReferences(Vec<String>),
    RemoveReference(String),
    ListReferences,
    ClearCanvas,
    /// Plain text or `/prompt`; `None` shows the current prompt.
    SetPrompt(Option<String>),
    AutoPrompt,
    Generate,
    SetSetting { key: String, value: String },
    ShowSettings,
    ShowSwatches,
    ShowLatest,
    ShowHistory,
    Save,
    Invalid { command: String, reason: String },
    Unknown { command: String, arg: String },
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn invalid(command: &str, reason: &str) -> ChatCommand {
    ChatCommand::Invalid {
        command: command.to_string(),
        reason: reason.to_string(),
    }
}

pub fn parse_command(text: &str) -> ChatCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ChatCommand::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return ChatCommand::SetPrompt(Some(raw_trimmed.to_string()));
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return ChatCommand::SetPrompt(Some(raw_trimmed.to_string()));
    }

    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    let Some(kind) = find_kind(&command) else {
        return ChatCommand::Unknown {
            command,
            arg: arg.to_string(),
        };
    };

    match kind {
        CommandKind::Help => ChatCommand::Help,
        CommandKind::Quit => ChatCommand::Quit,
        CommandKind::AddReferences => {
            let paths = parse_path_args(arg);
            if paths.is_empty() {
                return invalid(&command, "requires at least one path");
            }
            ChatCommand::AddReferences(paths)
        }
        CommandKind::RemoveReference => {
            if arg.is_empty() {
                return invalid(&command, "requires a reference id");
            }
            ChatCommand::RemoveReference(arg.to_string())
        }
        CommandKind::ListReferences => ChatCommand::ListReferences,
        CommandKind::ClearCanvas => ChatCommand::ClearCanvas,
        CommandKind::SetPrompt => {
            if arg.is_empty() {
                ChatCommand::SetPrompt(None)
            } else {
                ChatCommand::SetPrompt(Some(arg.to_string()))
            }
        }
        CommandKind::AutoPrompt => ChatCommand::AutoPrompt,
        CommandKind::Generate => ChatCommand::Generate,
        CommandKind::SetSetting => {
            let mut parts = arg.splitn(2, char::is_whitespace);
            let key = parts.next().unwrap_or("").trim();
            let value = parts.next().unwrap_or("").trim();
            if key.is_empty() {
                return invalid(&command, "requires a setting name and value");
            }
            ChatCommand::SetSetting {
                key: key.to_string(),
                value: value.to_string(),
            }
        }
        CommandKind::ShowSettings => ChatCommand::ShowSettings,
        CommandKind::ShowSwatches => ChatCommand::ShowSwatches,
        CommandKind::ShowLatest => ChatCommand::ShowLatest,
        CommandKind::ShowHistory => ChatCommand::ShowHistory,
        CommandKind::Save => ChatCommand::Save,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_command, ChatCommand};

    #[test]
    fn blank_line_is_noop() {
        assert_eq!(parse_command("   "), ChatCommand::Noop);
    }

    #[test]
    fn plain_text_sets_prompt() {
        assert_eq!(
            parse_command("  white sneaker on marble  "),
            ChatCommand::SetPrompt(Some("white sneaker on marble".to_string()))
        );
        assert_eq!(
            parse_command("/ leading slash only"),
            ChatCommand::SetPrompt(Some("/ leading slash only".to_string()))
        );
    }

    #[test]
    fn add_accepts_quoted_paths() {
        assert_eq!(
            parse_command("/add \"/tmp/a b.png\" c.jpg"),
            ChatCommand::AddReferences(vec!["/tmp/a b.png".to_string(), "c.jpg".to_string()])
        );
        assert!(matches!(
            parse_command("/add"),
            ChatCommand::Invalid { .. }
        ));
    }

    #[test]
    fn set_splits_key_from_rest_of_line() {
        assert_eq!(
            parse_command("/set style Luxury Editorial"),
            ChatCommand::SetSetting {
                key: "style".to_string(),
                value: "Luxury Editorial".to_string(),
            }
        );
        assert!(matches!(parse_command("/set"), ChatCommand::Invalid { .. }));
    }

    #[test]
    fn flow_commands_are_case_insensitive() {
        assert_eq!(parse_command("/AUTO"), ChatCommand::AutoPrompt);
        assert_eq!(parse_command("/generate"), ChatCommand::Generate);
        assert_eq!(parse_command("/clear"), ChatCommand::ClearCanvas);
        assert_eq!(parse_command("/exit"), ChatCommand::Quit);
        assert_eq!(parse_command("/prompt"), ChatCommand::SetPrompt(None));
    }

    #[test]
    fn unknown_command_keeps_its_argument() {
        assert_eq!(
            parse_command("/magic foo bar"),
            ChatCommand::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string(),
            }
        );
    }
}
