use std::path::{Path, PathBuf};

pub const CONTEXT_DIR_NAME: &str = ".context";
pub const GRAPH_FILE_NAME: &str = "graph.json";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const LOCKS_DIR_NAME: &str = "locks";
pub const STAGING_DIR_NAME: &str = "staging";

/// Project-scoped state directory (`<root>/.context`)
#[must_use]
pub fn context_dir_for_project_root(root: &Path) -> PathBuf {
    root.join(CONTEXT_DIR_NAME)
}

#[must_use]
pub fn graph_path_for_project_root(root: &Path) -> PathBuf {
    context_dir_for_project_root(root).join(GRAPH_FILE_NAME)
}

#[must_use]
pub fn config_path_for_project_root(root: &Path) -> PathBuf {
    context_dir_for_project_root(root).join(CONFIG_FILE_NAME)
}

#[must_use]
pub fn locks_dir_for_project_root(root: &Path) -> PathBuf {
    context_dir_for_project_root(root).join(LOCKS_DIR_NAME)
}

/// Scratch copies of the project used while a split is validated
#[must_use]
pub fn staging_dir_for_project_root(root: &Path) -> PathBuf {
    context_dir_for_project_root(root).join(STAGING_DIR_NAME)
}

#[must_use]
pub fn is_context_dir_name(name: &str) -> bool {
    name == CONTEXT_DIR_NAME
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn state_lives_under_context_dir() {
        let root = Path::new("/work/project");
        assert_eq!(
            graph_path_for_project_root(root),
            PathBuf::from("/work/project/.context/graph.json")
        );
        assert_eq!(
            locks_dir_for_project_root(root),
            PathBuf::from("/work/project/.context/locks")
        );
        assert_eq!(
            staging_dir_for_project_root(root),
            PathBuf::from("/work/project/.context/staging")
        );
        assert!(is_context_dir_name(".context"));
        assert!(!is_context_dir_name("context"));
    }
}
