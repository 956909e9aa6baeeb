// Ignore rules
//
// Git-ignore-style globs from config, always augmented with the engine
// state directory so the engine never indexes itself. Hidden-directory and
// glob checks run against the workspace-relative path, so a dotted parent
// directory of the workspace itself never ignores everything.

use crate::error::{EngineError, EngineResult};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct IgnoreRules {
    globs: GlobSet,
    engine_dir: PathBuf,
    workspace_root: PathBuf,
}

impl IgnoreRules {
    pub fn new(
        patterns: &[String],
        engine_dir: PathBuf,
        workspace_root: PathBuf,
    ) -> EngineResult<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| EngineError::Validation {
                reason: format!("invalid ignore pattern '{pattern}': {e}"),
            })?;
            builder.add(glob);
        }
        let globs = builder.build().map_err(|e| EngineError::Validation {
            reason: format!("failed to build ignore set: {e}"),
        })?;

        Ok(Self {
            globs,
            engine_dir,
            workspace_root,
        })
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        if path.starts_with(&self.engine_dir) {
            return true;
        }

        let relative = path.strip_prefix(&self.workspace_root).unwrap_or(path);
        if self.globs.is_match(relative) || self.globs.is_match(path) {
            return true;
        }

        // Hidden directories inside the workspace are never indexed
        relative.components().any(|c| {
            c.as_os_str()
                .to_str()
                .map(|s| s.starts_with('.') && s.len() > 1 && s != "." && s != "..")
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> IgnoreRules {
        IgnoreRules::new(
            &[
                "**/node_modules/**".to_string(),
                "**/target/**".to_string(),
                "**/*.min.js".to_string(),
            ],
            PathBuf::from("/ws/.quarry"),
            PathBuf::from("/ws"),
        )
        .unwrap()
    }

    #[test]
    fn test_engine_dir_always_ignored() {
        let rules = rules();
        assert!(rules.is_ignored(Path::new("/ws/.quarry/index/seg.idx")));
        assert!(rules.is_ignored(Path::new("/ws/.quarry/db/store.sqlite")));
    }

    #[test]
    fn test_configured_patterns() {
        let rules = rules();
        assert!(rules.is_ignored(Path::new("/ws/node_modules/react/index.js")));
        assert!(rules.is_ignored(Path::new("/ws/target/debug/build.rs")));
        assert!(rules.is_ignored(Path::new("/ws/dist/app.min.js")));
        assert!(!rules.is_ignored(Path::new("/ws/src/main.rs")));
    }

    #[test]
    fn test_hidden_directories_ignored() {
        let rules = rules();
        assert!(rules.is_ignored(Path::new("/ws/.git/objects/ab/cdef")));
        assert!(!rules.is_ignored(Path::new("/ws/src/lib.rs")));
    }

    #[test]
    fn test_hidden_workspace_parent_not_ignored() {
        // The workspace itself may live under a dotted directory (temp
        // dirs often do); only components below the root count.
        let rules = IgnoreRules::new(
            &[],
            PathBuf::from("/tmp/.tmpAbc123/.quarry"),
            PathBuf::from("/tmp/.tmpAbc123"),
        )
        .unwrap();

        assert!(!rules.is_ignored(Path::new("/tmp/.tmpAbc123/src/main.rs")));
        assert!(rules.is_ignored(Path::new("/tmp/.tmpAbc123/.git/HEAD")));
    }

    #[test]
    fn test_bad_pattern_is_validation_error() {
        let err = IgnoreRules::new(
            &["[".to_string()],
            PathBuf::from("/ws/.quarry"),
            PathBuf::from("/ws"),
        )
        .unwrap_err();
        assert_eq!(err.code(), "validation-error");
    }
}
