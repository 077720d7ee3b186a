//! Git URL normalization
//!
//! Accepted spellings for the same repository all normalize to one https
//! URL so the graph and ledger can use it as a stable identity key.

use crate::error::{AgentpackError, Result};

/// Split a `#ref` fragment off a source string.
///
/// Returns (main part, optional ref). `@` is not a ref separator here: it
/// appears in `gh@owner/repo` scoping and in registry version pins.
pub fn parse_fragment(input: &str) -> (&str, Option<&str>) {
    match input.find('#') {
        Some(pos) => (&input[..pos], Some(&input[pos + 1..])),
        None => (input, None),
    }
}

/// Split a scoped `gh@owner/repo/resource/...` spelling into the repo part
/// and the resource sub-path.
///
/// Only the `gh@` shorthand carries a resource path in its segments; full
/// URLs address a repository root.
pub fn split_scoped_path(input: &str) -> (&str, Option<String>) {
    let Some(rest) = input.strip_prefix("gh@") else {
        return (input, None);
    };

    let mut segments = rest.splitn(3, '/');
    let owner = segments.next().unwrap_or_default();
    let repo = segments.next().unwrap_or_default();
    let resource = segments.next();

    if owner.is_empty() || repo.is_empty() {
        return (input, None);
    }

    let repo_len = "gh@".len() + owner.len() + 1 + repo.len();
    (
        &input[..repo_len],
        resource.filter(|r| !r.is_empty()).map(str::to_string),
    )
}

/// Normalize a git URL or shorthand to a canonical https URL
pub fn normalize(input: &str) -> Result<String> {
    if let Some(rest) = input.strip_prefix("gh@") {
        if is_owner_repo(rest) {
            return Ok(format!("https://github.com/{rest}.git"));
        }
        return Err(AgentpackError::InvalidSourceUrl {
            url: input.to_string(),
        });
    }

    if let Some(rest) = input.strip_prefix("github:") {
        if is_owner_repo(rest) {
            return Ok(format!("https://github.com/{rest}.git"));
        }
        return Err(AgentpackError::InvalidSourceUrl {
            url: input.to_string(),
        });
    }

    if input.starts_with("https://") || input.starts_with("git@") || input.starts_with("ssh://") {
        return Ok(input.to_string());
    }

    Err(AgentpackError::SourceParseFailed {
        input: input.to_string(),
        reason: "Unknown git source format".to_string(),
    })
}

/// Identity key for a git URL: host-independent spellings of one repo
/// (https, ssh, trailing `.git`) collapse to the same key.
pub fn canonical_key(url: &str) -> String {
    let trimmed = url.trim_end_matches(".git");

    // git@host:owner/repo -> host/owner/repo
    if let Some(rest) = trimmed.strip_prefix("git@") {
        return rest.replacen(':', "/", 1);
    }

    trimmed
        .trim_start_matches("https://")
        .trim_start_matches("ssh://")
        .to_string()
}

/// Extract (owner, repo) from a normalized git URL
pub fn owner_repo(url: &str) -> Option<(String, String)> {
    let key = canonical_key(url);
    let parts: Vec<&str> = key.split('/').collect();
    if parts.len() >= 2 {
        let repo = parts[parts.len() - 1];
        let owner = parts[parts.len() - 2];
        if !owner.is_empty() && !repo.is_empty() {
            return Some((owner.to_string(), repo.to_string()));
        }
    }
    None
}

fn is_owner_repo(input: &str) -> bool {
    !input.contains("://") && input.matches('/').count() == 1 && !input.starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragment() {
        assert_eq!(parse_fragment("gh@o/r#main"), ("gh@o/r", Some("main")));
        assert_eq!(parse_fragment("gh@o/r"), ("gh@o/r", None));
    }

    #[test]
    fn test_split_scoped_path() {
        let (repo, resource) = split_scoped_path("gh@owner/repo/agents/a1");
        assert_eq!(repo, "gh@owner/repo");
        assert_eq!(resource.as_deref(), Some("agents/a1"));

        let (repo, resource) = split_scoped_path("gh@owner/repo");
        assert_eq!(repo, "gh@owner/repo");
        assert!(resource.is_none());
    }

    #[test]
    fn test_normalize_shorthands() {
        assert_eq!(
            normalize("gh@owner/repo").unwrap(),
            "https://github.com/owner/repo.git"
        );
        assert_eq!(
            normalize("github:owner/repo").unwrap(),
            "https://github.com/owner/repo.git"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize("owner-only").is_err());
        assert!(normalize("gh@owner").is_err());
    }

    #[test]
    fn test_canonical_key_collapses_spellings() {
        assert_eq!(
            canonical_key("https://github.com/owner/repo.git"),
            "github.com/owner/repo"
        );
        assert_eq!(
            canonical_key("git@github.com:owner/repo.git"),
            "github.com/owner/repo"
        );
    }

    #[test]
    fn test_owner_repo() {
        assert_eq!(
            owner_repo("https://github.com/wshobson/agents.git"),
            Some(("wshobson".to_string(), "agents".to_string()))
        );
        assert_eq!(owner_repo("https://example.com"), None);
    }
}
