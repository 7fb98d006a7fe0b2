//! Demo-token markdown artefact: parse and structural checks.
//!
//! A demo token is the completion evidence a mission leaves at
//! `<worktree>/demo/MISSION-<id>.md`: YAML front matter delimited by `---`
//! followed by `###` evidence sections.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Required front-matter keys, each of which must be non-empty.
pub const REQUIRED_KEYS: [&str; 6] = [
    "mission_id",
    "title",
    "classification",
    "status",
    "created_at",
    "agent_id",
];

/// Parsed front matter of a demo token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoFrontMatter {
    pub mission_id: String,
    pub title: String,
    pub classification: String,
    pub status: String,
    pub created_at: String,
    pub agent_id: String,
}

/// A reference to a changed file, `path — note`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRef {
    pub path: String,
    pub note: String,
}

/// Parsed demo token.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoToken {
    pub front_matter: DemoFrontMatter,
    /// Section name (lowercased) to raw body lines.
    pub sections: BTreeMap<String, Vec<String>>,
}

/// Canonical on-disk location for a mission's demo token.
pub fn canonical_path(worktree: &Path, mission_id: &str) -> PathBuf {
    worktree.join("demo").join(format!("MISSION-{mission_id}.md"))
}

impl DemoToken {
    /// Parse the markdown document. Front matter must be the first block,
    /// delimited by `---` lines.
    pub fn parse(input: &str) -> DomainResult<Self> {
        let mut lines = input.lines();
        if lines.next().map(str::trim) != Some("---") {
            return Err(DomainError::DemoToken(
                "missing front matter delimiter".into(),
            ));
        }
        let mut front = String::new();
        let mut closed = false;
        for line in lines.by_ref() {
            if line.trim() == "---" {
                closed = true;
                break;
            }
            front.push_str(line);
            front.push('\n');
        }
        if !closed {
            return Err(DomainError::DemoToken(
                "unterminated front matter block".into(),
            ));
        }

        let raw: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(&front)
            .map_err(|e| DomainError::DemoToken(format!("front matter is not YAML: {e}")))?;
        let get = |key: &str| -> DomainResult<String> {
            let value = raw.get(key).ok_or_else(|| missing_key(key))?;
            let text = yaml_scalar(value).ok_or_else(|| missing_key(key))?;
            if text.trim().is_empty() {
                return Err(missing_key(key));
            }
            Ok(text)
        };
        let front_matter = DemoFrontMatter {
            mission_id: get("mission_id")?,
            title: get("title")?,
            classification: get("classification")?,
            status: get("status")?,
            created_at: get("created_at")?,
            agent_id: get("agent_id")?,
        };

        let mut sections: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut current: Option<String> = None;
        for line in lines {
            if let Some(name) = line.strip_prefix("### ") {
                current = Some(name.trim().to_lowercase());
                sections.entry(current.clone().unwrap_or_default()).or_default();
            } else if let Some(section) = &current {
                if !line.trim().is_empty() {
                    if let Some(lines) = sections.get_mut(section) {
                        lines.push(line.trim().to_string());
                    }
                }
            }
        }

        Ok(Self {
            front_matter,
            sections,
        })
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections
            .get(name)
            .map(|lines| !lines.is_empty())
            .unwrap_or(false)
    }

    /// Entries of the `diff_refs` section, `- path — note` items.
    pub fn diff_refs(&self) -> Vec<DiffRef> {
        let Some(lines) = self.sections.get("diff_refs") else {
            return Vec::new();
        };
        lines
            .iter()
            .filter_map(|line| {
                let item = line.trim_start_matches(['-', '*']).trim();
                if item.is_empty() {
                    return None;
                }
                let (path, note) = item
                    .split_once(" \u{2014} ")
                    .or_else(|| item.split_once(" - "))
                    .unwrap_or((item, ""));
                Some(DiffRef {
                    path: path.trim().to_string(),
                    note: note.trim().to_string(),
                })
            })
            .collect()
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn missing_key(key: &str) -> DomainError {
    DomainError::DemoToken(format!("front matter key {key} is missing or empty"))
}

/// Render a skeleton token for a mission, used by the CLI and harness
/// prompts to show the expected shape.
pub fn render_skeleton(
    mission_id: &str,
    title: &str,
    classification: &str,
    agent_id: &str,
    created_at: &str,
) -> String {
    format!(
        "---\nmission_id: {mission_id}\ntitle: {title}\nclassification: {classification}\n\
         status: complete\ncreated_at: {created_at}\nagent_id: {agent_id}\n---\n\n\
         ### tests\n\n### commands\n\n### notes\n"
    )
}
