//! Subagent templates: markdown files with YAML frontmatter under
//! `<working_dir>/.claude/agents/`. The frontmatter configures the agent
//! (tools, model, color); the body becomes its system prompt.

use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Deserialize)]
pub struct TemplateFrontmatter {
    pub name: String,
    pub description: String,
    #[serde(default, deserialize_with = "tools_list_or_string")]
    pub tools: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// `tools` may be a YAML list or a comma-separated string.
fn tools_list_or_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        One(String),
    }
    Ok(match Option::<ListOrString>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(ListOrString::List(list)) => list,
        Some(ListOrString::One(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
    })
}

#[derive(Clone, Debug)]
pub struct SubagentTemplate {
    pub frontmatter: TemplateFrontmatter,
    pub prompt_body: String,
    pub file_path: PathBuf,
}

/// Splits `---`-delimited frontmatter from the body. `None` when the file
/// has no well-formed frontmatter block.
pub(crate) fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let end = rest.find("\n---")?;
    let frontmatter = &rest[..end];
    let body = rest[end + 4..].trim_start_matches('\n');
    Some((frontmatter, body))
}

fn parse_template_file(path: &Path) -> Option<SubagentTemplate> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %path.display(), "failed to read template: {e}");
            return None;
        }
    };
    let Some((frontmatter_text, body)) = split_frontmatter(&content) else {
        tracing::error!(path = %path.display(), "template missing frontmatter delimiters");
        return None;
    };
    let frontmatter: TemplateFrontmatter = match serde_yaml::from_str(frontmatter_text) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!(path = %path.display(), "invalid template frontmatter: {e}");
            return None;
        }
    };
    Some(SubagentTemplate {
        frontmatter,
        prompt_body: body.trim().to_string(),
        file_path: path.to_path_buf(),
    })
}

/// Registry of discovered templates, keyed by frontmatter name.
pub struct TemplateRegistry {
    templates: BTreeMap<String, SubagentTemplate>,
}

impl TemplateRegistry {
    /// Scans `<working_dir>/.claude/agents/*.md`. Invalid files are skipped
    /// with a warning; a missing directory yields an empty registry.
    pub fn discover(working_dir: &Path) -> Self {
        let dir = working_dir.join(".claude").join("agents");
        let mut templates = BTreeMap::new();

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => {
                tracing::warn!(dir = %dir.display(), "subagent templates directory not found");
                return Self { templates };
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            if let Some(template) = parse_template_file(&path) {
                tracing::info!(
                    name = %template.frontmatter.name,
                    tools = template.frontmatter.tools.len(),
                    "loaded subagent template"
                );
                templates.insert(template.frontmatter.name.clone(), template);
            } else {
                tracing::warn!(path = %path.display(), "skipping invalid template");
            }
        }
        Self { templates }
    }

    pub fn get(&self, name: &str) -> Option<&SubagentTemplate> {
        self.templates.get(name)
    }

    pub fn available_names(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// `{name, description}` pairs for prompt injection and the UI.
    pub fn list(&self) -> Vec<serde_json::Value> {
        self.templates
            .values()
            .map(|t| json!({"name": t.frontmatter.name, "description": t.frontmatter.description}))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_template(dir: &Path, file: &str, content: &str) {
        let agents = dir.join(".claude").join("agents");
        std::fs::create_dir_all(&agents).unwrap();
        std::fs::write(agents.join(file), content).unwrap();
    }

    #[test]
    fn discovers_valid_templates() {
        let dir = tempfile::tempdir().unwrap();
        write_template(
            dir.path(),
            "builder.md",
            "---\nname: builder\ndescription: Builds things\ntools: [Read, Write]\nmodel: sonnet\ncolor: blue\n---\n\nYou are a builder.\n",
        );
        let registry = TemplateRegistry::discover(dir.path());
        let t = registry.get("builder").unwrap();
        assert_eq!(t.frontmatter.tools, vec!["Read", "Write"]);
        assert_eq!(t.frontmatter.model.as_deref(), Some("sonnet"));
        assert_eq!(t.prompt_body, "You are a builder.");
    }

    #[test]
    fn comma_separated_tools_are_split() {
        let dir = tempfile::tempdir().unwrap();
        write_template(
            dir.path(),
            "r.md",
            "---\nname: reviewer\ndescription: Reviews\ntools: Read, Grep , Glob\n---\nBody\n",
        );
        let registry = TemplateRegistry::discover(dir.path());
        assert_eq!(
            registry.get("reviewer").unwrap().frontmatter.tools,
            vec!["Read", "Grep", "Glob"]
        );
    }

    #[test]
    fn invalid_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "bad.md", "no frontmatter here");
        write_template(
            dir.path(),
            "ok.md",
            "---\nname: ok\ndescription: fine\n---\nBody\n",
        );
        let registry = TemplateRegistry::discover(dir.path());
        assert_eq!(registry.available_names(), vec!["ok"]);
    }

    #[test]
    fn missing_directory_yields_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TemplateRegistry::discover(dir.path());
        assert!(registry.is_empty());
    }

    #[test]
    fn split_frontmatter_requires_both_delimiters() {
        assert!(split_frontmatter("---\nname: x").is_none());
        assert!(split_frontmatter("name: x\n").is_none());
        let (fm, body) = split_frontmatter("---\nname: x\n---\nbody").unwrap();
        assert_eq!(fm.trim(), "name: x");
        assert_eq!(body, "body");
    }
}
