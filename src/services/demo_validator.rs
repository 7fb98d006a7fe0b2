//! Demo-token validation against a mission worktree.

use std::path::Path;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::demo_token::{canonical_path, DemoToken};
use crate::domain::models::{Classification, MissionPlan};

/// Validates the completion evidence a mission leaves in its worktree.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoValidator;

impl DemoValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate the token at its canonical location.
    ///
    /// The file must exist, its front matter must be complete with a
    /// matching mission id, every `diff_refs` path must resolve inside the
    /// worktree, and the evidence sections must match the classification.
    pub async fn validate(&self, worktree: &Path, mission: &MissionPlan) -> DomainResult<DemoToken> {
        let path = canonical_path(worktree, &mission.id);
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            DomainError::DemoToken(format!("missing demo token at {}: {e}", path.display()))
        })?;
        let token = DemoToken::parse(&raw)?;

        if token.front_matter.mission_id != mission.id {
            return Err(DomainError::DemoToken(format!(
                "demo token names mission {} but {} was executed",
                token.front_matter.mission_id, mission.id
            )));
        }

        for diff_ref in token.diff_refs() {
            let referenced = worktree.join(&diff_ref.path);
            if !referenced.exists() {
                return Err(DomainError::DemoToken(format!(
                    "diff_refs path {} does not exist in the worktree",
                    diff_ref.path
                )));
            }
        }

        match mission.classification.tag {
            Classification::RedAlert => {
                if !token.has_section("tests") {
                    return Err(DomainError::DemoToken(
                        "RED_ALERT token requires a tests section".into(),
                    ));
                }
                if !token.has_section("commands") && !token.has_section("diff_refs") {
                    return Err(DomainError::DemoToken(
                        "RED_ALERT token requires commands or diff_refs".into(),
                    ));
                }
            }
            Classification::StandardOps => {
                if !token.has_section("commands")
                    && !token.has_section("diff_refs")
                    && !token.has_section("manual_steps")
                {
                    return Err(DomainError::DemoToken(
                        "STANDARD_OPS token requires commands, diff_refs, or manual_steps".into(),
                    ));
                }
            }
        }

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::mission::{ClassifiedRisk, MissionPlan};

    fn mission(id: &str, tag: Classification) -> MissionPlan {
        let mut m = MissionPlan::new(id, "mission");
        m.classification = ClassifiedRisk {
            tag,
            confidence: 1.0,
            needs_review: false,
            source: Default::default(),
        };
        m
    }

    fn write_token(dir: &Path, mission_id: &str, body: &str) {
        let demo = dir.join("demo");
        std::fs::create_dir_all(&demo).unwrap();
        let content = format!(
            "---\nmission_id: {mission_id}\ntitle: t\nclassification: RED_ALERT\n\
             status: complete\ncreated_at: 2026-07-01T00:00:00Z\nagent_id: a-1\n---\n\n{body}"
        );
        std::fs::write(demo.join(format!("MISSION-{mission_id}.md")), content).unwrap();
    }

    #[tokio::test]
    async fn red_alert_requires_tests_section() {
        let dir = tempfile::tempdir().unwrap();
        write_token(dir.path(), "M-1", "### commands\n- cargo test\n");
        let err = DemoValidator::new()
            .validate(dir.path(), &mission("M-1", Classification::RedAlert))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tests section"));
    }

    #[tokio::test]
    async fn red_alert_accepts_tests_plus_commands() {
        let dir = tempfile::tempdir().unwrap();
        write_token(dir.path(), "M-1", "### tests\n- cargo test red\n\n### commands\n- cargo test\n");
        DemoValidator::new()
            .validate(dir.path(), &mission("M-1", Classification::RedAlert))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn standard_ops_accepts_manual_steps() {
        let dir = tempfile::tempdir().unwrap();
        write_token(dir.path(), "M-1", "### manual_steps\n1. open the app\n");
        DemoValidator::new()
            .validate(dir.path(), &mission("M-1", Classification::StandardOps))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn diff_refs_must_resolve() {
        let dir = tempfile::tempdir().unwrap();
        write_token(
            dir.path(),
            "M-1",
            "### tests\n- t\n\n### diff_refs\n- src/ghost.rs \u{2014} phantom\n",
        );
        let err = DemoValidator::new()
            .validate(dir.path(), &mission("M-1", Classification::RedAlert))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost.rs"));
    }

    #[tokio::test]
    async fn mission_id_must_match() {
        let dir = tempfile::tempdir().unwrap();
        write_token(dir.path(), "M-2", "### tests\n- t\n\n### commands\n- c\n");
        // Token exists for M-2; validating M-1 fails on the missing file.
        let err = DemoValidator::new()
            .validate(dir.path(), &mission("M-1", Classification::RedAlert))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing demo token"));
    }

    #[tokio::test]
    async fn front_matter_mismatch_detected() {
        let dir = tempfile::tempdir().unwrap();
        // Write a token whose file name says M-1 but front matter says M-9.
        let demo = dir.path().join("demo");
        std::fs::create_dir_all(&demo).unwrap();
        let content = "---\nmission_id: M-9\ntitle: t\nclassification: RED_ALERT\n\
                       status: complete\ncreated_at: 2026-07-01T00:00:00Z\nagent_id: a-1\n---\n\n\
                       ### tests\n- t\n\n### commands\n- c\n";
        std::fs::write(demo.join("MISSION-M-1.md"), content).unwrap();
        let err = DemoValidator::new()
            .validate(dir.path(), &mission("M-1", Classification::RedAlert))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("names mission M-9"));
    }
}
