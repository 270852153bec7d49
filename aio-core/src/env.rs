//! Environment identifiers and fallback chains.

/// The four well-known environment names. Any other string is accepted
/// as a caller-defined environment, but only these have a built-in
/// fallback chain.
pub const DEV: &str = "dev";
pub const TEST: &str = "test";
pub const STAG: &str = "stag";
pub const PROD: &str = "prod";
pub const DEFAULT: &str = "default";
pub const ALL: &str = "all";

/// Returns the default fallback chain for `env`, not including `env`
/// itself and not including the implicit trailing `default`.
///
/// - `prod` -> `[stag]`
/// - `stag` -> `[test, dev]`
/// - `test` -> `[dev]`
/// - `dev`  -> `[]`
/// - anything else -> `[]` (caller must supply an explicit chain)
pub fn default_fallback_chain(env: &str) -> Vec<String> {
    match env {
        PROD => vec![STAG.to_string()],
        STAG => vec![TEST.to_string(), DEV.to_string()],
        TEST => vec![DEV.to_string()],
        DEV => vec![],
        _ => vec![],
    }
}

/// Builds the full resolution chain for `env`: `[env] ++ fallback ++ [default]`,
/// deduplicated while preserving first occurrence.
pub fn resolution_chain(env: &str, explicit_fallback: Option<&[String]>) -> Vec<String> {
    let mut chain = vec![env.to_string()];
    match explicit_fallback {
        Some(fallback) => chain.extend(fallback.iter().cloned()),
        None => chain.extend(default_fallback_chain(env)),
    }
    chain.push(DEFAULT.to_string());

    let mut seen = std::collections::HashSet::new();
    chain.retain(|e| seen.insert(e.clone()));
    chain
}

/// `true` if `filter` means "no environment filtering".
pub fn is_env_wildcard(filter: &str) -> bool {
    filter.is_empty() || filter.eq_ignore_ascii_case(ALL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prod_falls_back_through_stag() {
        assert_eq!(resolution_chain(PROD, None), vec!["prod", "stag", "default"]);
    }

    #[test]
    fn stag_falls_back_through_test_then_dev() {
        assert_eq!(resolution_chain(STAG, None), vec!["stag", "test", "dev", "default"]);
    }

    #[test]
    fn dev_has_no_fallback_besides_default() {
        assert_eq!(resolution_chain(DEV, None), vec!["dev", "default"]);
    }

    #[test]
    fn explicit_chain_overrides_default() {
        assert_eq!(
            resolution_chain(PROD, Some(&["dev".to_string()])),
            vec!["prod", "dev", "default"]
        );
    }

    #[test]
    fn env_wildcard_matches_all_and_empty() {
        assert!(is_env_wildcard(""));
        assert!(is_env_wildcard("all"));
        assert!(is_env_wildcard("ALL"));
        assert!(!is_env_wildcard("dev"));
    }
}
