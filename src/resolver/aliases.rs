use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use path_clean::PathClean;
use serde::Serialize;
use tracing::debug;

use super::workspace::discover_workspace_packages;

/// Where an alias entry came from. Earlier origins win ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasOrigin {
    /// `[aliases]` in `codewise-graph.toml` or `--alias` on the command line.
    Config,
    /// `compilerOptions.paths` in `tsconfig.json` / `jsconfig.json`.
    Tsconfig,
    /// A monorepo workspace package name.
    Workspace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasEntry {
    /// Prefix as matched against specifiers. A trailing `/` means "prefix of a
    /// path"; without it the prefix matches exactly or followed by `/`.
    pub prefix: String,
    /// Root the prefix is substituted with, relative to the project root.
    pub root: PathBuf,
    pub origin: AliasOrigin,
}

impl AliasEntry {
    /// Returns the remainder of `specifier` after this prefix, if it matches.
    fn strip<'s>(&self, specifier: &'s str) -> Option<&'s str> {
        if self.prefix.ends_with('/') {
            return specifier.strip_prefix(self.prefix.as_str());
        }
        if specifier == self.prefix {
            return Some("");
        }
        specifier
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

/// Alias prefix -> root substitution table. Read-only during extraction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AliasTable {
    entries: Vec<AliasEntry>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an alias. `prefix` may use the tsconfig wildcard form (`@/*`); the
    /// `*` is dropped. The first entry for a given prefix wins.
    pub fn insert(&mut self, prefix: &str, root: impl AsRef<Path>, origin: AliasOrigin) {
        let prefix = prefix.trim_end_matches('*').to_owned();
        if prefix.is_empty() || prefix.starts_with('.') {
            debug!(prefix, "alias: ignoring empty or relative prefix");
            return;
        }
        if self.entries.iter().any(|e| e.prefix == prefix) {
            return;
        }
        let root = root.as_ref();
        let root_str = root.to_string_lossy();
        let root = PathBuf::from(root_str.trim_end_matches('*')).clean();
        self.entries.push(AliasEntry {
            prefix,
            root,
            origin,
        });
    }

    /// Longest matching prefix; ties keep insertion order.
    pub fn match_specifier<'s>(&self, specifier: &'s str) -> Option<(&AliasEntry, &'s str)> {
        let mut best: Option<(&AliasEntry, &'s str)> = None;
        for entry in &self.entries {
            if let Some(rest) = entry.strip(specifier) {
                let longer = best
                    .map(|(b, _)| entry.prefix.len() > b.prefix.len())
                    .unwrap_or(true);
                if longer {
                    best = Some((entry, rest));
                }
            }
        }
        best
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AliasEntry> {
        self.entries.iter()
    }

    /// Build the table for a project: configured aliases first, then tsconfig
    /// `paths`, then workspace packages.
    ///
    /// Absolute roots are made project-relative; roots outside the project are
    /// kept absolute and therefore never resolve.
    pub fn for_project(project_root: &Path, configured: &BTreeMap<String, String>) -> Self {
        let mut table = Self::new();

        for (prefix, root) in configured {
            table.insert(prefix, relative_to(project_root, Path::new(root)), AliasOrigin::Config);
        }

        for (prefix, root) in read_tsconfig_paths(project_root) {
            table.insert(&prefix, root, AliasOrigin::Tsconfig);
        }

        for (name, dir) in discover_workspace_packages(project_root) {
            table.insert(&name, relative_to(project_root, &dir), AliasOrigin::Workspace);
        }

        debug!(aliases = table.len(), "alias table assembled");
        table
    }
}

fn relative_to(project_root: &Path, root: &Path) -> PathBuf {
    if root.is_absolute() {
        root.strip_prefix(project_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| root.to_path_buf())
    } else {
        root.to_path_buf()
    }
}

/// Read `compilerOptions.paths` from `tsconfig.json` (or `jsconfig.json`).
///
/// Only the first target of each pattern is used. Config files are parsed as
/// JSON5 since both formats allow comments and trailing commas.
fn read_tsconfig_paths(project_root: &Path) -> Vec<(String, PathBuf)> {
    let config_path = ["tsconfig.json", "jsconfig.json"]
        .iter()
        .map(|name| project_root.join(name))
        .find(|p| p.is_file());
    let config_path = match config_path {
        Some(p) => p,
        None => return Vec::new(),
    };

    let content = match std::fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(err) => {
            debug!(path = %config_path.display(), %err, "alias: cannot read config");
            return Vec::new();
        }
    };
    let json: serde_json::Value = match json5::from_str(&content) {
        Ok(v) => v,
        Err(err) => {
            debug!(path = %config_path.display(), %err, "alias: cannot parse config");
            return Vec::new();
        }
    };

    parse_compiler_paths(&json)
}

pub(crate) fn parse_compiler_paths(json: &serde_json::Value) -> Vec<(String, PathBuf)> {
    let options = &json["compilerOptions"];
    let base_url = options["baseUrl"].as_str().unwrap_or(".");
    let paths = match options["paths"].as_object() {
        Some(p) => p,
        None => return Vec::new(),
    };

    let mut result = Vec::new();
    for (pattern, targets) in paths {
        let first = targets
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str());
        if let Some(target) = first {
            let root = Path::new(base_url).join(target.trim_end_matches('*'));
            result.push((pattern.clone(), root));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_prefix_with_slash_matches_paths_only() {
        let mut table = AliasTable::new();
        table.insert("@/", "src", AliasOrigin::Config);
        let (entry, rest) = table.match_specifier("@/components/Button").unwrap();
        assert_eq!(entry.root, PathBuf::from("src"));
        assert_eq!(rest, "components/Button");
        assert!(table.match_specifier("@org/pkg").is_none());
    }

    #[test]
    fn test_bare_prefix_matches_exact_or_segment() {
        let mut table = AliasTable::new();
        table.insert("~utils", "src/utils", AliasOrigin::Config);
        assert_eq!(table.match_specifier("~utils").unwrap().1, "");
        assert_eq!(table.match_specifier("~utils/date").unwrap().1, "date");
        assert!(table.match_specifier("~utilsExtra").is_none());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut table = AliasTable::new();
        table.insert("@/", "src", AliasOrigin::Config);
        table.insert("@/ui/", "packages/ui/src", AliasOrigin::Config);
        let (entry, rest) = table.match_specifier("@/ui/Button").unwrap();
        assert_eq!(entry.root, PathBuf::from("packages/ui/src"));
        assert_eq!(rest, "Button");
    }

    #[test]
    fn test_wildcard_prefix_normalised_and_first_wins() {
        let mut table = AliasTable::new();
        table.insert("@/*", "./src/*", AliasOrigin::Tsconfig);
        table.insert("@/", "lib", AliasOrigin::Workspace);
        assert_eq!(table.len(), 1);
        let (entry, _) = table.match_specifier("@/a").unwrap();
        assert_eq!(entry.root, PathBuf::from("src"));
        assert_eq!(entry.origin, AliasOrigin::Tsconfig);
    }

    #[test]
    fn test_parse_compiler_paths_with_base_url() {
        let json = serde_json::json!({
            "compilerOptions": {
                "baseUrl": "./app",
                "paths": { "@/*": ["src/*"], "config": ["config/index.ts"] }
            }
        });
        let mut paths = parse_compiler_paths(&json);
        paths.sort();
        assert_eq!(
            paths,
            vec![
                ("@/*".to_string(), PathBuf::from("./app/src/")),
                ("config".to_string(), PathBuf::from("./app/config/index.ts")),
            ]
        );
    }

    #[test]
    fn test_for_project_reads_tsconfig_with_comments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{
  // vite template
  "compilerOptions": { "paths": { "@/*": ["./src/*"], }, },
}"#,
        )
        .unwrap();
        let mut configured = BTreeMap::new();
        configured.insert("~/".to_string(), "lib".to_string());
        let table = AliasTable::for_project(dir.path(), &configured);

        let origins: Vec<_> = table.iter().map(|e| (e.prefix.as_str(), e.origin)).collect();
        assert_eq!(
            origins,
            vec![("~/", AliasOrigin::Config), ("@/", AliasOrigin::Tsconfig)]
        );
        assert_eq!(table.match_specifier("@/x").unwrap().0.root, PathBuf::from("src"));
    }
}
