//! Surface-area lock model and pattern conflict rules.

use chrono::{DateTime, Utc};
use globset::GlobBuilder;
use serde::{Deserialize, Serialize};

/// A time-bounded exclusive reservation over a set of glob patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceLock {
    pub mission_id: String,
    pub patterns: Vec<String>,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SurfaceLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// True when any pattern of this lock conflicts with any candidate
    /// pattern.
    pub fn conflicts_with(&self, patterns: &[String]) -> bool {
        self.patterns.iter().any(|held| {
            patterns
                .iter()
                .any(|candidate| patterns_conflict(held, candidate))
        })
    }
}

/// Forward-slash normalize a surface pattern.
pub fn normalize_pattern(pattern: &str) -> String {
    let mut p = pattern.trim().replace('\\', "/");
    while let Some(stripped) = p.strip_prefix("./") {
        p = stripped.to_string();
    }
    while p.ends_with('/') && p.len() > 1 {
        p.pop();
    }
    p
}

/// Two patterns conflict iff they are equal post-normalization, either
/// glob-matches the other, or one has suffix `/**` whose prefix is a
/// path-prefix of the other.
pub fn patterns_conflict(a: &str, b: &str) -> bool {
    let a = normalize_pattern(a);
    let b = normalize_pattern(b);
    if a == b {
        return true;
    }
    glob_covers(&a, &b)
        || glob_covers(&b, &a)
        || recursive_covers(&a, &b)
        || recursive_covers(&b, &a)
}

/// Shell-glob match of `pattern` against `path`.
fn glob_covers(pattern: &str, path: &str) -> bool {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .map(|g| g.compile_matcher().is_match(path))
        .unwrap_or(false)
}

/// `src/**` covers `src` itself and everything under it.
fn recursive_covers(pattern: &str, other: &str) -> bool {
    let Some(prefix) = pattern.strip_suffix("/**") else {
        return false;
    };
    other == prefix || other.starts_with(&format!("{prefix}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_patterns_conflict() {
        assert!(patterns_conflict("src/api/*.rs", "src/api/*.rs"));
        assert!(patterns_conflict("src/api/", "src/api"));
        assert!(patterns_conflict(".\\src\\api", "src/api"));
    }

    #[test]
    fn glob_match_either_direction_conflicts() {
        assert!(patterns_conflict("src/*.rs", "src/lib.rs"));
        assert!(patterns_conflict("src/lib.rs", "src/*.rs"));
        assert!(!patterns_conflict("src/*.rs", "docs/readme.md"));
    }

    #[test]
    fn recursive_suffix_covers_prefix() {
        assert!(patterns_conflict("src/**", "src/api/handlers.rs"));
        assert!(patterns_conflict("src/api/handlers.rs", "src/**"));
        assert!(patterns_conflict("src/**", "src"));
        assert!(!patterns_conflict("src/**", "srclib/module.rs"));
    }

    #[test]
    fn disjoint_trees_do_not_conflict() {
        assert!(!patterns_conflict("backend/**", "frontend/**"));
        assert!(!patterns_conflict("src/a/*.rs", "src/b/*.rs"));
    }
}
