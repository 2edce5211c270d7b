use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Discover workspace packages of an npm/yarn/pnpm monorepo.
///
/// Returns package name (e.g. `"@myorg/utils"`) -> package source directory
/// (`<pkg>/src/` when it exists, otherwise `<pkg>/`). Empty when the project
/// declares no workspaces. Ordered by name so alias tables built from it are
/// deterministic.
pub fn discover_workspace_packages(root: &Path) -> BTreeMap<String, PathBuf> {
    let mut packages = BTreeMap::new();

    for pattern in read_workspace_globs(root) {
        let full_pattern = root.join(&pattern).join("package.json");
        let Ok(paths) = glob::glob(&full_pattern.to_string_lossy()) else {
            debug!(pattern, "workspace: invalid glob");
            continue;
        };
        for manifest in paths.flatten() {
            if manifest.components().any(|c| c.as_os_str() == "node_modules") {
                continue;
            }
            let Some(pkg_dir) = manifest.parent() else {
                continue;
            };
            if let Some(name) = package_name(&manifest) {
                let src = pkg_dir.join("src");
                let target = if src.is_dir() { src } else { pkg_dir.to_path_buf() };
                debug!(package = %name, dir = %target.display(), "workspace package");
                packages.entry(name).or_insert(target);
            }
        }
    }

    packages
}

fn package_name(manifest: &Path) -> Option<String> {
    let content = std::fs::read_to_string(manifest).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    json["name"].as_str().map(str::to_owned)
}

/// Workspace glob patterns: `pnpm-workspace.yaml` first, then the
/// `workspaces` field of `package.json` (array or `{ packages: [...] }`).
fn read_workspace_globs(root: &Path) -> Vec<String> {
    if let Ok(content) = std::fs::read_to_string(root.join("pnpm-workspace.yaml")) {
        return parse_pnpm_workspace_yaml(&content);
    }

    let Ok(content) = std::fs::read_to_string(root.join("package.json")) else {
        return Vec::new();
    };
    let Ok(json) = serde_json::from_str::<serde_json::Value>(&content) else {
        return Vec::new();
    };
    let workspaces = &json["workspaces"];
    let list = workspaces
        .as_array()
        .or_else(|| workspaces["packages"].as_array());
    list.map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(String::from))
            .filter(|g| !g.starts_with('!'))
            .collect()
    })
    .unwrap_or_default()
}

/// Line parser for the `packages:` list of `pnpm-workspace.yaml`:
///
/// ```yaml
/// packages:
///   - 'packages/*'
///   - "apps/*"
///   - tools/*
/// ```
///
/// Negated globs (`!**/test/**`) are skipped.
pub(crate) fn parse_pnpm_workspace_yaml(content: &str) -> Vec<String> {
    let mut globs = Vec::new();
    let mut in_packages = false;

    for line in content.lines() {
        let trimmed = line.trim_end();
        if trimmed.trim_start().starts_with('#') {
            continue;
        }

        if trimmed.trim() == "packages:" {
            in_packages = true;
            continue;
        }
        if !in_packages {
            continue;
        }
        // Next top-level key ends the list.
        if !trimmed.is_empty() && !trimmed.starts_with(' ') && !trimmed.starts_with('-') {
            break;
        }

        if let Some(item) = trimmed.trim_start().strip_prefix("- ") {
            let item = item.trim().trim_matches(|c| c == '\'' || c == '"');
            if !item.is_empty() && !item.starts_with('!') {
                globs.push(item.to_owned());
            }
        }
    }

    globs
}
