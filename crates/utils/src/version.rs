use std::sync::LazyLock;

/// Defines the application version.
pub static VERSION: LazyLock<String> =
    LazyLock::new(|| render(option_env!("VERGEN_GIT_SHA"), option_env!("VERGEN_GIT_DIRTY")));

fn render(commit_sha: Option<&str>, dirty: Option<&str>) -> String {
    format!(
        "{}-{}{}",
        env!("IMAGE_VERSION"),
        commit_sha.map(|sha| &sha[..sha.len().min(8)]).unwrap_or("unknown"),
        if dirty == Some("true") { "-dirty" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn render_without_git_metadata() {
        assert_eq!(
            render(None, None),
            format!("{}-unknown", env!("IMAGE_VERSION"))
        );
    }

    #[test]
    fn render_short_sha_and_dirty_flag() {
        assert_eq!(
            render(Some("0123456789abcdef"), Some("true")),
            format!("{}-01234567-dirty", env!("IMAGE_VERSION"))
        );
    }
}
