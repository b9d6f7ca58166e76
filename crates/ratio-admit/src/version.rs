use std::sync::LazyLock;

/// Placeholder vergen writes when git information is unavailable.
const IDEMPOTENT_OUTPUT: &str = "VERGEN_IDEMPOTENT_OUTPUT";

/// Crate version with the git commit it was built from, when known.
pub static VERSION: LazyLock<String> =
    LazyLock::new(|| render(option_env!("VERGEN_GIT_SHA"), option_env!("VERGEN_GIT_DIRTY")));

fn render(sha: Option<&str>, dirty: Option<&str>) -> String {
    match sha.filter(|sha| *sha != IDEMPOTENT_OUTPUT) {
        Some(sha) => format!(
            "{}-{}{}",
            env!("CARGO_PKG_VERSION"),
            sha,
            if dirty == Some("true") { "-dirty" } else { "" }
        ),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn version_starts_with_package_version() {
        assert!(VERSION.starts_with(env!("CARGO_PKG_VERSION")));
        assert!(!VERSION.contains(IDEMPOTENT_OUTPUT));
    }

    #[test]
    fn placeholder_sha_is_treated_as_absent() {
        assert_eq!(
            render(Some(IDEMPOTENT_OUTPUT), Some(IDEMPOTENT_OUTPUT)),
            env!("CARGO_PKG_VERSION")
        );
        assert_eq!(
            render(Some("1a2b3c4"), Some("true")),
            format!("{}-1a2b3c4-dirty", env!("CARGO_PKG_VERSION"))
        );
        assert_eq!(
            render(Some("1a2b3c4"), Some("false")),
            format!("{}-1a2b3c4", env!("CARGO_PKG_VERSION"))
        );
        assert_eq!(render(None, None), env!("CARGO_PKG_VERSION"));
    }
}
