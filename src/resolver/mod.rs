pub mod aliases;
pub mod workspace;

pub use aliases::{AliasOrigin, AliasTable};
pub use workspace::discover_workspace_packages;

use std::path::{Component, Path, PathBuf};

use path_clean::PathClean;
use serde::Serialize;
use tracing::debug;

use crate::language::is_source_extension;

/// Extensions probed for extension-less specifiers, typed dialects first.
/// The first existing candidate wins.
pub const PROBE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Typed counterparts tried when a plain-JavaScript specifier does not exist on
/// disk (TypeScript ESM sources import `./foo.js` for `./foo.ts`).
const TYPED_ALTERNATIVES: &[&str] = &["ts", "tsx", "mts", "cts"];

/// The outcome of resolving one import/export source string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "status", content = "path", rename_all = "camelCase")]
pub enum Resolution {
    /// A project-relative path (with `/` separators) of an existing file.
    Resolved(String),
    /// A package specifier: not relative and not aliased. No resolution attempted.
    External,
    /// Relative or aliased, but no file matched.
    Unresolved,
}

impl Resolution {
    pub fn resolved_path(&self) -> Option<&str> {
        match self {
            Self::Resolved(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "resolved",
            Self::External => "external",
            Self::Unresolved => "unresolved",
        }
    }
}

/// Resolves module specifiers to project-relative file paths.
///
/// Shared read-only across extraction workers; every method takes `&self`.
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    root: PathBuf,
    aliases: AliasTable,
}

impl ModuleResolver {
    pub fn new(root: impl Into<PathBuf>, aliases: AliasTable) -> Self {
        Self {
            root: root.into(),
            aliases,
        }
    }

    /// Resolve `specifier` as written in `from_file` (a project-relative path).
    ///
    /// 1. Not `./`, `../` or an alias prefix -> [`Resolution::External`].
    /// 2. Relative specifiers resolve against the importer's directory, aliased
    ///    ones against the alias root.
    /// 3. A candidate with a source extension is checked as-is.
    /// 4. Otherwise [`PROBE_EXTENSIONS`] are tried in order, then `index.<ext>`
    ///    inside the candidate directory.
    /// 5. No match -> [`Resolution::Unresolved`].
    pub fn resolve(&self, specifier: &str, from_file: &str) -> Resolution {
        let spec = strip_query(specifier);

        let candidate = if is_relative(spec) {
            let dir = Path::new(from_file).parent().unwrap_or_else(|| Path::new(""));
            dir.join(spec)
        } else if let Some((entry, rest)) = self.aliases.match_specifier(spec) {
            if rest.is_empty() {
                entry.root.clone()
            } else {
                entry.root.join(rest)
            }
        } else {
            return Resolution::External;
        };

        let candidate = candidate.clean();
        if escapes_root(&candidate) {
            debug!(specifier, from_file, "resolve: candidate escapes the project root");
            return Resolution::Unresolved;
        }

        let outcome = self.probe(&candidate);
        if outcome == Resolution::Unresolved {
            debug!(specifier, from_file, "resolve: no file matched");
        }
        outcome
    }

    fn probe(&self, candidate: &Path) -> Resolution {
        let ext = candidate.extension().and_then(|e| e.to_str());

        if let Some(ext) = ext
            && is_source_extension(ext)
        {
            if self.is_file(candidate) {
                return Resolution::Resolved(slash_path(candidate));
            }
            if matches!(ext, "js" | "jsx" | "mjs" | "cjs") {
                for typed in TYPED_ALTERNATIVES {
                    let alt = candidate.with_extension(typed);
                    if self.is_file(&alt) {
                        return Resolution::Resolved(slash_path(&alt));
                    }
                }
            }
            return Resolution::Unresolved;
        }

        // Non-source assets (`./styles.css`, `./data.json`) that exist on disk.
        if ext.is_some() && self.is_file(candidate) {
            return Resolution::Resolved(slash_path(candidate));
        }

        for ext in PROBE_EXTENSIONS {
            let file = append_extension(candidate, ext);
            if self.is_file(&file) {
                return Resolution::Resolved(slash_path(&file));
            }
        }

        if self.root.join(candidate).is_dir() {
            for ext in PROBE_EXTENSIONS {
                let index = candidate.join(format!("index.{ext}"));
                if self.is_file(&index) {
                    return Resolution::Resolved(slash_path(&index));
                }
            }
        }

        Resolution::Unresolved
    }

    fn is_file(&self, rel: &Path) -> bool {
        self.root.join(rel).is_file()
    }
}

/// True for `./x`, `../x`, `.` and `..`.
pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
}

/// Drop `?query` and `#fragment` suffixes used by bundlers (`./icon.svg?raw`).
fn strip_query(specifier: &str) -> &str {
    specifier
        .split(['?', '#'])
        .next()
        .unwrap_or(specifier)
        .trim()
}

fn escapes_root(path: &Path) -> bool {
    path.is_absolute() || matches!(path.components().next(), Some(Component::ParentDir))
}

/// `Button.stories` + `tsx` -> `Button.stories.tsx` (never replaces an existing
/// dotted suffix the way `with_extension` would).
fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

/// Render a relative path with `/` separators regardless of platform.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project(files: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "export {}").unwrap();
        }
        dir
    }

    fn resolver(dir: &TempDir, aliases: AliasTable) -> ModuleResolver {
        ModuleResolver::new(dir.path(), aliases)
    }

    #[test]
    fn test_package_specifier_is_external() {
        let dir = project(&["src/a.ts"]);
        let r = resolver(&dir, AliasTable::default());
        assert_eq!(r.resolve("react", "src/a.ts"), Resolution::External);
        assert_eq!(r.resolve("@org/utils", "src/a.ts"), Resolution::External);
    }

    #[test]
    fn test_relative_with_extension_probe() {
        let dir = project(&["src/a.ts", "src/lib/format.ts"]);
        let r = resolver(&dir, AliasTable::default());
        assert_eq!(
            r.resolve("./lib/format", "src/a.ts"),
            Resolution::Resolved("src/lib/format.ts".into())
        );
        assert_eq!(
            r.resolve("../src/lib/format", "src/a.ts"),
            Resolution::Resolved("src/lib/format.ts".into())
        );
    }

    #[test]
    fn test_typed_variant_wins_over_plain() {
        let dir = project(&["src/a.ts", "src/util.ts", "src/util.js", "src/util.tsx"]);
        let r = resolver(&dir, AliasTable::default());
        assert_eq!(
            r.resolve("./util", "src/a.ts"),
            Resolution::Resolved("src/util.ts".into())
        );
    }

    #[test]
    fn test_explicit_extension_checked_directly() {
        let dir = project(&["src/a.ts", "src/util.js"]);
        let r = resolver(&dir, AliasTable::default());
        assert_eq!(
            r.resolve("./util.js", "src/a.ts"),
            Resolution::Resolved("src/util.js".into())
        );
        assert_eq!(r.resolve("./missing.ts", "src/a.ts"), Resolution::Unresolved);
    }

    #[test]
    fn test_js_specifier_maps_to_typed_source() {
        let dir = project(&["src/a.ts", "src/util.ts"]);
        let r = resolver(&dir, AliasTable::default());
        assert_eq!(
            r.resolve("./util.js", "src/a.ts"),
            Resolution::Resolved("src/util.ts".into())
        );
    }

    #[test]
    fn test_directory_index_after_direct_files() {
        let dir = project(&["src/a.ts", "src/components/index.tsx", "src/helpers/index.js"]);
        let r = resolver(&dir, AliasTable::default());
        assert_eq!(
            r.resolve("./components", "src/a.ts"),
            Resolution::Resolved("src/components/index.tsx".into())
        );
        assert_eq!(
            r.resolve("./helpers", "src/a.ts"),
            Resolution::Resolved("src/helpers/index.js".into())
        );
    }

    #[test]
    fn test_direct_file_beats_directory_index() {
        let dir = project(&["src/a.ts", "src/store.js", "src/store/index.ts"]);
        let r = resolver(&dir, AliasTable::default());
        assert_eq!(
            r.resolve("./store", "src/a.ts"),
            Resolution::Resolved("src/store.js".into())
        );
    }

    #[test]
    fn test_alias_prefix_resolution() {
        let dir = project(&["src/a.ts", "src/components/Button.tsx"]);
        let mut aliases = AliasTable::default();
        aliases.insert("@/", "src", AliasOrigin::Config);
        let r = resolver(&dir, aliases);
        assert_eq!(
            r.resolve("@/components/Button", "src/a.ts"),
            Resolution::Resolved("src/components/Button.tsx".into())
        );
    }

    #[test]
    fn test_alias_missing_target_is_unresolved() {
        let dir = project(&["src/a.ts"]);
        let mut aliases = AliasTable::default();
        aliases.insert("@/", "src", AliasOrigin::Config);
        let r = resolver(&dir, aliases);
        assert_eq!(r.resolve("@/nowhere/Thing", "src/a.ts"), Resolution::Unresolved);
    }

    #[test]
    fn test_existing_asset_resolves() {
        let dir = project(&["src/a.ts", "src/styles.css"]);
        let r = resolver(&dir, AliasTable::default());
        assert_eq!(
            r.resolve("./styles.css?inline", "src/a.ts"),
            Resolution::Resolved("src/styles.css".into())
        );
    }

    #[test]
    fn test_escaping_root_is_unresolved() {
        let dir = project(&["a.ts"]);
        let r = resolver(&dir, AliasTable::default());
        assert_eq!(r.resolve("../outside", "a.ts"), Resolution::Unresolved);
    }

    #[test]
    fn test_dotted_stem_is_not_replaced() {
        let dir = project(&["src/a.ts", "src/Button.stories.tsx"]);
        let r = resolver(&dir, AliasTable::default());
        assert_eq!(
            r.resolve("./Button.stories", "src/a.ts"),
            Resolution::Resolved("src/Button.stories.tsx".into())
        );
    }
}
