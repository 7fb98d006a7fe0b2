//! Harness driver port: the contract for agent subprocess sessions.
//!
//! Implementations spawn and talk to agent CLIs; the core relies only on
//! stable session ids, synchronous message exchange, and idempotent
//! termination.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::DomainResult;

/// A detached, named harness session. The id is stable for later
/// operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessSession {
    pub id: String,
    pub name: String,
    pub role: String,
    pub pid: Option<u32>,
}

/// Options for spawning a session.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub env: BTreeMap<String, String>,
    /// Mission id, when the caller already knows it; otherwise discovered
    /// from the prompt for session naming.
    pub mission_id: Option<String>,
}

#[async_trait]
pub trait HarnessDriver: Send + Sync {
    /// Spawn a detached session and return its descriptor.
    async fn spawn_session(
        &self,
        cancel: &CancellationToken,
        role: &str,
        prompt: &str,
        workdir: &Path,
        opts: SpawnOptions,
    ) -> DomainResult<HarnessSession>;

    /// Send a message to a session and return the captured output.
    async fn send_message(
        &self,
        cancel: &CancellationToken,
        session: &HarnessSession,
        message: &str,
    ) -> DomainResult<String>;

    /// Terminate a session. Idempotent.
    async fn terminate(&self, session: &HarnessSession) -> DomainResult<()>;
}

/// Lowercase, `[^a-z0-9]+` to `-`, trim leading/trailing `-`.
pub fn slugify(input: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new("[^a-z0-9]+").unwrap_or_else(|_| unreachable!()));
    re.replace_all(&input.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Find a mission id in a prompt, e.g. `mission M-1` or `MISSION-M-1`.
pub fn discover_mission_id(prompt: &str) -> Option<String> {
    static MISSION: OnceLock<Regex> = OnceLock::new();
    let re = MISSION.get_or_init(|| {
        Regex::new(r"(?i)mission[\s:-]+([A-Za-z0-9][A-Za-z0-9_-]*)").unwrap_or_else(|_| unreachable!())
    });
    re.captures(prompt)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// `sc3-<role-slug>-mission-<id-slug>` when a mission id is discoverable
/// in the prompt, else `sc3-<role-slug>-session`.
pub fn session_name(role: &str, prompt: &str, mission_id: Option<&str>) -> String {
    let role_slug = slugify(role);
    let discovered;
    let id = match mission_id {
        Some(id) => Some(id),
        None => {
            discovered = discover_mission_id(prompt);
            discovered.as_deref()
        }
    };
    match id {
        Some(id) => format!("sc3-{role_slug}-mission-{}", slugify(id)),
        None => format!("sc3-{role_slug}-session"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("Design Officer"), "design-officer");
        assert_eq!(slugify("--M_1!!"), "m-1");
        assert_eq!(slugify("implementer"), "implementer");
    }

    #[test]
    fn session_name_with_discoverable_mission() {
        let name = session_name("implementer", "Work mission M-1 per the plan.", None);
        assert_eq!(name, "sc3-implementer-mission-m-1");
    }

    #[test]
    fn session_name_without_mission() {
        let name = session_name("captain", "Review the charter.", None);
        assert_eq!(name, "sc3-captain-session");
    }

    #[test]
    fn explicit_mission_id_wins() {
        let name = session_name("reviewer", "mission M-9", Some("M-2"));
        assert_eq!(name, "sc3-reviewer-mission-m-2");
    }
}
