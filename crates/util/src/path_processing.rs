use dirs_next::home_dir;
use std::path::PathBuf;

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    if let Some(rest) = p.strip_prefix("~\\") {
        // Windows-style
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_plain_paths_untouched() {
        assert_eq!(expand_tilde(" /etc/listwise/config.yaml "), PathBuf::from("/etc/listwise/config.yaml"));
    }

    #[test]
    fn expands_home_prefix() {
        let expanded = expand_tilde("~/listwise/config.yaml");
        assert!(expanded.ends_with("listwise/config.yaml"));
        if home_dir().is_some() {
            assert!(!expanded.starts_with("~"));
        }
    }
}
