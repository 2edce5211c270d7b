use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::GraphConfig;
use crate::language::is_source_extension;

/// Dependency and build directories that are never walked.
const EXCLUDED_DIRS: &[&str] = &["node_modules", "dist", "build", ".next", "coverage", "out"];

/// A discovered source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub abs_path: PathBuf,
    /// Project-relative path with `/` separators; the file id.
    pub rel_path: String,
}

/// Walk a project directory and collect source files, sorted by relative path.
///
/// Respects `.gitignore` rules, always skips dependency/build directories and
/// `skip_dir` (the output directory), applies `config.exclude`, and, when
/// `config.pattern` is set, keeps only files whose relative path matches it.
pub fn walk_project(root: &Path, config: &GraphConfig, skip_dir: Option<&Path>) -> Vec<DiscoveredFile> {
    let include = config.pattern.as_deref().and_then(|p| match glob::Pattern::new(p) {
        Ok(pattern) => Some(pattern),
        Err(err) => {
            warn!(pattern = p, "ignoring invalid include pattern: {err}");
            None
        }
    });
    let excludes = compile_excludes(config);
    let skip_dir = skip_dir.map(Path::to_path_buf);

    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(true)
        // Read .gitignore files even when the directory is not inside a git repository.
        .require_git(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            if !is_dir || entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_str().unwrap_or("");
            if EXCLUDED_DIRS.contains(&name) {
                return false;
            }
            skip_dir.as_deref() != Some(entry.path())
        })
        .build();

    let mut files = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(err) => {
                warn!("{err}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !is_source_extension(ext) {
            continue;
        }
        // Declaration files carry no Definitions.
        if path.to_str().is_some_and(|s| s.ends_with(".d.ts")) {
            continue;
        }
        if is_excluded(path, &excludes) {
            continue;
        }

        let Some(rel_path) = relative_path(root, path) else {
            continue;
        };
        if let Some(pattern) = &include
            && !pattern.matches(&rel_path)
        {
            continue;
        }

        debug!(path = %rel_path, "discovered");
        files.push(DiscoveredFile {
            abs_path: path.to_path_buf(),
            rel_path,
        });
    }

    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files
}

fn compile_excludes(config: &GraphConfig) -> Vec<glob::Pattern> {
    config
        .exclude
        .iter()
        .flatten()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                warn!(pattern = %p, "ignoring invalid exclude pattern: {err}");
                None
            }
        })
        .collect()
}

/// Returns true if the full path or any of its components matches an exclusion pattern.
fn is_excluded(path: &Path, excludes: &[glob::Pattern]) -> bool {
    let path_str = path.to_string_lossy();
    excludes.iter().any(|pattern| {
        pattern.matches(&path_str)
            || path
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .any(|s| pattern.matches(s))
    })
}

/// `/`-separated path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tmp() -> TempDir {
        tempfile::tempdir().expect("tempdir")
    }

    fn touch(dir: &TempDir, rel: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export {};\n").unwrap();
    }

    fn rel_paths(files: &[DiscoveredFile]) -> Vec<&str> {
        files.iter().map(|f| f.rel_path.as_str()).collect()
    }

    #[test]
    fn test_walk_returns_sorted_source_files() {
        let dir = tmp();
        touch(&dir, "src/b.tsx");
        touch(&dir, "src/a.ts");
        touch(&dir, "lib/util.mjs");
        touch(&dir, "README.md");
        touch(&dir, "src/types.d.ts");

        let files = walk_project(dir.path(), &GraphConfig::default(), None);
        assert_eq!(rel_paths(&files), vec!["lib/util.mjs", "src/a.ts", "src/b.tsx"]);
        assert!(files[0].abs_path.is_absolute());
    }

    #[test]
    fn test_walk_skips_dependency_and_build_dirs() {
        let dir = tmp();
        touch(&dir, "node_modules/pkg/index.js");
        touch(&dir, "dist/app.js");
        touch(&dir, "packages/ui/node_modules/x/index.js");
        touch(&dir, "packages/ui/src/Button.tsx");

        let files = walk_project(dir.path(), &GraphConfig::default(), None);
        assert_eq!(rel_paths(&files), vec!["packages/ui/src/Button.tsx"]);
    }

    #[test]
    fn test_walk_respects_exclude_and_pattern() {
        let dir = tmp();
        touch(&dir, "src/App.tsx");
        touch(&dir, "src/App.stories.tsx");
        touch(&dir, "src/fixtures/data.ts");
        touch(&dir, "scripts/build.js");

        let config = GraphConfig {
            exclude: Some(vec!["*.stories.tsx".into(), "fixtures".into()]),
            pattern: Some("src/**/*".into()),
            ..GraphConfig::default()
        };
        let files = walk_project(dir.path(), &config, None);
        assert_eq!(rel_paths(&files), vec!["src/App.tsx"]);
    }

    #[test]
    fn test_walk_skips_output_dir_and_gitignored() {
        let dir = tmp();
        touch(&dir, "src/a.ts");
        touch(&dir, "graph/src/a.ts");
        touch(&dir, "generated/api.ts");
        fs::write(dir.path().join(".gitignore"), "generated/\n").unwrap();

        let out = dir.path().join("graph");
        let files = walk_project(dir.path(), &GraphConfig::default(), Some(&out));
        assert_eq!(rel_paths(&files), vec!["src/a.ts"]);
    }
}
