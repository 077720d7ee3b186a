//! Package-name scoping helpers
//!
//! Declared names carry an optional resource scope below the package base:
//! `gh@owner/repo/agents/a1` scopes `agents/a1` inside `gh@owner/repo`,
//! `toolkit/rules/git` scopes `rules/git` inside registry package `toolkit`.
//! Subsumption and the namespace slug both key off this split.

/// Split a declared name into (base package name, optional resource path).
///
/// For `gh@owner/repo/...` names the base is the first two segments after
/// the scope marker; for all other names the base is the first segment.
pub fn split_scoped(name: &str) -> (&str, Option<&str>) {
    if let Some(rest) = name.strip_prefix("gh@") {
        let mut end = 0usize;
        for (i, segment) in rest.split('/').enumerate() {
            if i == 2 {
                let base_len = "gh@".len() + end - 1;
                let resource = &name[base_len + 1..];
                if resource.is_empty() {
                    return (&name[..base_len], None);
                }
                return (&name[..base_len], Some(resource));
            }
            end += segment.len() + 1;
        }
        return (name, None);
    }

    match name.split_once('/') {
        Some((base, resource)) if !resource.is_empty() => (base, Some(resource)),
        _ => (name, None),
    }
}

/// Base package name (the non-resource-scoped portion)
pub fn base_name(name: &str) -> &str {
    split_scoped(name).0
}

/// Derive the short namespace directory segment from a package name.
///
/// - `gh@owner/repo/.../leaf` -> `leaf`
/// - `gh@owner/repo` -> `repo`
/// - anything else -> the full normalized name, with path separators
///   flattened so the slug stays a single segment
pub fn namespace_slug(name: &str) -> String {
    if name.starts_with("gh@") {
        let (base, resource) = split_scoped(name);
        if let Some(resource) = resource {
            if let Some(leaf) = resource.rsplit('/').next() {
                if !leaf.is_empty() {
                    return leaf.to_string();
                }
            }
        }
        if let Some(repo) = base.rsplit('/').next() {
            return repo.to_string();
        }
    }

    name.replace('/', "-")
}

/// True when `candidate` is a strict path-prefix descendant of `ancestor`
/// (i.e. `candidate` starts with `ancestor` plus a separator).
pub fn is_strict_descendant(candidate: &str, ancestor: &str) -> bool {
    candidate.len() > ancestor.len() + 1 && candidate.starts_with(ancestor) && {
        candidate.as_bytes()[ancestor.len()] == b'/'
    }
}
