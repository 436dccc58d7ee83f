//! Slash-command discovery: `<working_dir>/.claude/commands/*.md` with YAML
//! frontmatter. The `argument-hint` field is documentation notation, not
//! YAML (`add [tagId] | remove [tagId]`), so it is force-quoted before
//! parsing.

use crate::templates::split_frontmatter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommandFrontmatter {
    #[serde(rename = "allowed-tools")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(rename = "argument-hint")]
    pub argument_hint: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    #[serde(rename = "disable-model-invocation")]
    pub disable_model_invocation: bool,
}

/// Quotes `argument-hint:` values so square brackets survive YAML parsing.
fn quote_argument_hint(frontmatter: &str) -> String {
    frontmatter
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if let Some(value) = trimmed.strip_prefix("argument-hint:") {
                let value = value.trim();
                if !value.is_empty() && !value.starts_with('"') && !value.starts_with('\'') {
                    let indent = &line[..line.len() - trimmed.len()];
                    let escaped = value.replace('"', "\\\"");
                    return format!("{indent}argument-hint: \"{escaped}\"");
                }
            }
            line.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_command(name: &str, content: &str) -> Value {
    let (frontmatter, body) = match split_frontmatter(content) {
        Some((fm, body)) => {
            let quoted = quote_argument_hint(fm);
            let parsed: CommandFrontmatter = serde_yaml::from_str(&quoted).unwrap_or_else(|e| {
                tracing::warn!(command = name, "invalid command frontmatter: {e}");
                CommandFrontmatter::default()
            });
            (parsed, body)
        }
        None => (CommandFrontmatter::default(), content),
    };

    // First non-empty body line doubles as the description.
    let description = frontmatter.description.clone().unwrap_or_else(|| {
        body.lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
            .to_string()
    });

    json!({
        "name": name,
        "description": description,
        "argument_hint": frontmatter.argument_hint,
        "model": frontmatter.model,
        "allowed_tools": frontmatter.allowed_tools,
        "disable_model_invocation": frontmatter.disable_model_invocation,
    })
}

/// Discovers slash commands under `<working_dir>/.claude/commands/`,
/// sorted by name. A missing directory yields an empty list.
pub fn discover_slash_commands(working_dir: &Path) -> Vec<Value> {
    let dir = working_dir.join(".claude").join("commands");
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut commands = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match std::fs::read_to_string(&path) {
            Ok(content) => commands.push(parse_command(name, &content)),
            Err(e) => tracing::warn!(path = %path.display(), "unreadable command file: {e}"),
        }
    }
    commands.sort_by(|a, b| {
        a["name"].as_str().unwrap_or("").cmp(b["name"].as_str().unwrap_or(""))
    });
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_command(dir: &Path, file: &str, content: &str) {
        let commands = dir.join(".claude").join("commands");
        std::fs::create_dir_all(&commands).unwrap();
        std::fs::write(commands.join(file), content).unwrap();
    }

    #[test]
    fn argument_hint_brackets_survive_parsing() {
        let dir = tempfile::tempdir().unwrap();
        write_command(
            dir.path(),
            "tag.md",
            "---\ndescription: Manage tags\nargument-hint: add [tagId] | remove [tagId] | list\n---\nBody\n",
        );
        let commands = discover_slash_commands(dir.path());
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0]["argument_hint"], "add [tagId] | remove [tagId] | list");
    }

    #[test]
    fn description_falls_back_to_first_body_line() {
        let dir = tempfile::tempdir().unwrap();
        write_command(dir.path(), "plain.md", "Run the deployment checklist.\n\nMore detail.\n");
        let commands = discover_slash_commands(dir.path());
        assert_eq!(commands[0]["description"], "Run the deployment checklist.");
        assert_eq!(commands[0]["name"], "plain");
    }

    #[test]
    fn commands_are_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        write_command(dir.path(), "zeta.md", "z\n");
        write_command(dir.path(), "alpha.md", "a\n");
        let commands = discover_slash_commands(dir.path());
        assert_eq!(commands[0]["name"], "alpha");
        assert_eq!(commands[1]["name"], "zeta");
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_slash_commands(dir.path()).is_empty());
    }
}
