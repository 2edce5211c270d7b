//! Whole-graph properties, checked on small temporary projects through the
//! library API and the emitted JSON.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use codewise_graph::config::GraphConfig;
use codewise_graph::graph::edge::EdgeKind;
use codewise_graph::linker::link;
use codewise_graph::pipeline::{build_resolver, detect_collisions, extract_project, run};
use codewise_graph::resolver::{AliasOrigin, AliasTable, ModuleResolver, Resolution};
use codewise_graph::walker::walk_project;
use serde_json::Value;
use tempfile::TempDir;

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for (rel, src) in files {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, src).unwrap();
    }
    dir
}

fn read_json(path: &Path) -> Value {
    let bytes = fs::read(path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
    serde_json::from_slice(&bytes).unwrap()
}

const DASHBOARD: &str = r#"import React, { useState } from 'react';
import Chart from './Chart';
import { formatDate, parseDate } from '@/utils/dates';
import Missing from '@/widgets/Missing';

/** Top-level dashboard page. */
export default function Dashboard({ items }) {
  const [open, setOpen] = useState(false);

  function Header() {
    function label() {
      return formatDate(new Date());
    }
    return <h1>{label()}</h1>;
  }

  const renderRow = (item) => <Chart data={item} />;

  return (
    <>
      <Header />
      <Missing />
      {items.map(renderRow)}
    </>
  );
}

export class Store {
  load() {
    function label() {
      return 'store';
    }
    return label();
  }
}
"#;

const CHART: &str = r#"// Renders a single chart.
export default function Chart({ data }) {
  return <svg>{data}</svg>;
}
"#;

const DATES: &str = r#"export function formatDate(d) {
  return d.toISOString();
}

export function parseDate(s) {
  return new Date(s);
}
"#;

fn sample() -> TempDir {
    project(&[
        ("src/Dashboard.jsx", DASHBOARD),
        ("src/Chart.tsx", CHART),
        ("src/utils/dates.ts", DATES),
        (
            "codewise-graph.toml",
            "[aliases]\n\"@/\" = \"src/\"\n",
        ),
    ])
}

#[test]
fn test_top_level_flag_and_unique_qualified_names() {
    let dir = sample();
    let config = GraphConfig::load(dir.path());
    let resolver = build_resolver(dir.path(), &config);
    let discovered = walk_project(dir.path(), &config, None);
    let extraction = extract_project(&discovered, &resolver, &config.extract_options()).unwrap();
    assert!(extraction.failures.is_empty(), "{:?}", extraction.failures);

    let mut names = HashSet::new();
    for file in &extraction.files {
        for def in &file.definitions {
            assert_eq!(def.is_top_level(), def.scope_path().is_none(), "{}", def.qualified_name());
            assert!(names.insert(def.qualified_name().to_owned()), "duplicate {}", def.qualified_name());
        }
    }
    let (collisions, _) = detect_collisions(&extraction.files);
    assert!(collisions.is_empty());
}

#[test]
fn test_same_name_in_different_scopes_both_emitted() {
    let dir = sample();
    let report = run(dir.path(), &GraphConfig::load(dir.path())).unwrap();
    let out = &report.output_dir;

    let nested = out.join("src/Dashboard/nested");
    let a = read_json(&nested.join("Dashboard.Header.label.json"));
    let b = read_json(&nested.join("Store.label.json"));
    assert_eq!(a["definitionInfo"]["qualifiedName"], "src/Dashboard.jsx::Dashboard.Header.label");
    assert_eq!(b["definitionInfo"]["qualifiedName"], "src/Dashboard.jsx::Store.label");
    assert_eq!(a["definitionInfo"]["scopePath"], "Dashboard.Header");
    assert_eq!(b["definitionInfo"]["scopePath"], "Store");
    assert!(report.summary.collisions.is_empty());
}

#[test]
fn test_default_export_markup_backward_edge() {
    let dir = sample();
    let report = run(dir.path(), &GraphConfig::load(dir.path())).unwrap();

    let chart = read_json(&report.output_dir.join("src/Chart/top-level/Chart.json"));
    let backward = chart["dependencyInfo"]["backwardReferences"].as_array().unwrap();
    assert_eq!(backward.len(), 1, "{backward:?}");
    assert_eq!(backward[0]["sourceQualifiedName"], "src/Dashboard.jsx::Dashboard.renderRow");
    assert_eq!(backward[0]["kind"], "markup_element");
    assert_eq!(chart["definitionInfo"]["description"], "Renders a single chart.");
}

#[test]
fn test_unused_import_yields_no_edge() {
    let dir = sample();
    let report = run(dir.path(), &GraphConfig::load(dir.path())).unwrap();

    let parse = read_json(&report.output_dir.join("src/utils/dates/top-level/parseDate.json"));
    assert!(parse["dependencyInfo"]["backwardReferences"].as_array().unwrap().is_empty());

    let format = read_json(&report.output_dir.join("src/utils/dates/top-level/formatDate.json"));
    let backward = format["dependencyInfo"]["backwardReferences"].as_array().unwrap();
    assert_eq!(backward.len(), 1);
    assert_eq!(backward[0]["sourceQualifiedName"], "src/Dashboard.jsx::Dashboard.Header.label");
    assert_eq!(backward[0]["kind"], "function_call");

    let dashboard = read_json(&report.output_dir.join("src/Dashboard/top-level/Dashboard.json"));
    let symbols: Vec<&str> = dashboard["dependencyInfo"]["forwardReferences"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["symbol"].as_str().unwrap())
        .collect();
    assert!(!symbols.contains(&"parseDate"));
}

#[test]
fn test_missing_alias_target_keeps_edge_with_null_path() {
    let dir = sample();
    let report = run(dir.path(), &GraphConfig::load(dir.path())).unwrap();

    let dashboard = read_json(&report.output_dir.join("src/Dashboard/top-level/Dashboard.json"));
    let forward = dashboard["dependencyInfo"]["forwardReferences"].as_array().unwrap();
    let missing = forward
        .iter()
        .find(|r| r["source"] == "@/widgets/Missing")
        .expect("edge to the missing module is kept");
    assert!(missing["resolvedPath"].is_null());
    assert_eq!(missing["isExternal"], false);
    assert_eq!(missing["target"]["status"], "unresolved");

    let react = forward.iter().find(|r| r["source"] == "react").unwrap();
    assert_eq!(react["isExternal"], true);
    assert_eq!(react["symbol"], "useState");
}

#[test]
fn test_typed_variant_resolves_first() {
    let dir = project(&[
        ("src/util.ts", ""),
        ("src/util.tsx", ""),
        ("src/util.js", ""),
        ("src/util.jsx", ""),
        ("src/util.mjs", ""),
        ("src/util/index.ts", ""),
    ]);
    let mut aliases = AliasTable::new();
    aliases.insert("~/", "src/", AliasOrigin::Config);
    let resolver = ModuleResolver::new(dir.path(), aliases);
    assert_eq!(
        resolver.resolve("./util", "src/App.tsx"),
        Resolution::Resolved("src/util.ts".into())
    );
    assert_eq!(
        resolver.resolve("~/util", "lib/deep/x.ts"),
        Resolution::Resolved("src/util.ts".into())
    );

    fs::remove_file(dir.path().join("src/util.ts")).unwrap();
    assert_eq!(
        resolver.resolve("./util", "src/App.tsx"),
        Resolution::Resolved("src/util.tsx".into())
    );
}

#[test]
fn test_linking_is_idempotent() {
    let dir = sample();
    let config = GraphConfig::load(dir.path());
    let resolver = build_resolver(dir.path(), &config);
    let discovered = walk_project(dir.path(), &config, None);
    let extraction = extract_project(&discovered, &resolver, &config.extract_options()).unwrap();

    let first = link(&extraction.files);
    let second = link(&extraction.files);
    assert_eq!(first.stats, second.stats);
    for (file_idx, file) in extraction.files.iter().enumerate() {
        for def_idx in 0..file.definitions.len() {
            assert_eq!(first.backward(file_idx, def_idx), second.backward(file_idx, def_idx));
            assert_eq!(first.targets(file_idx, def_idx), second.targets(file_idx, def_idx));
            let backward = first.backward(file_idx, def_idx);
            assert!(backward.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}

#[test]
fn test_emission_is_byte_identical_across_runs() {
    let dir = sample();
    let config = GraphConfig::load(dir.path());
    let first = run(dir.path(), &config).unwrap();
    let record = first.output_dir.join("src/Chart/top-level/Chart.json");
    let before = fs::read(&record).unwrap();
    let second = run(dir.path(), &config).unwrap();
    assert_eq!(before, fs::read(&record).unwrap());
    assert_eq!(first.summary.links, second.summary.links);
}

#[test]
fn test_nested_scope_depth_survives_deep_nesting() {
    let dir = project(&[(
        "src/deep.ts",
        r#"export function a() {
  function b() {
    const c = () => {
      function d() {
        return 1;
      }
      return d();
    };
    return c();
  }
  return b();
}
export function after() {
  return a();
}
"#,
    )]);
    let report = run(dir.path(), &GraphConfig::default()).unwrap();
    assert_eq!(report.summary.total_definitions, 5);
    assert_eq!(report.summary.top_level_definitions, 2);

    let after = read_json(&report.output_dir.join("src/deep/top-level/after.json"));
    assert_eq!(after["definitionInfo"]["isTopLevel"], true);
    let d = read_json(&report.output_dir.join("src/deep/nested/a.b.c.d.json"));
    assert_eq!(d["definitionInfo"]["qualifiedName"], "src/deep.ts::a.b.c.d");

    let a = read_json(&report.output_dir.join("src/deep/top-level/a.json"));
    let backward = a["dependencyInfo"]["backwardReferences"].as_array().unwrap();
    assert_eq!(backward[0]["kind"], EdgeKind::FunctionCall.as_str());
}

#[test]
fn test_same_line_imports_emit_in_stable_order() {
    let dir = project(&[
        ("src/a.tsx", "export default function A() {\n  return <i />;\n}\n"),
        ("src/b.tsx", "export default function B() {\n  return <i />;\n}\n"),
        ("src/c.tsx", "export default function C() {\n  return <i />;\n}\n"),
        ("src/d.tsx", "export default function D() {\n  return <i />;\n}\n"),
        (
            "src/page.tsx",
            "import C from './c';\nimport A from './a';\nimport D from './d';\nimport B from './b';\n\nexport function Page() {\n  return <><A /><B /><C /><D /></>;\n}\n",
        ),
    ]);
    let config = GraphConfig::default();
    let record = |report: &codewise_graph::pipeline::RunReport| {
        fs::read(report.output_dir.join("src/page/top-level/Page.json")).unwrap()
    };
    let first = record(&run(dir.path(), &config).unwrap());
    let page: Value = serde_json::from_slice(&first).unwrap();
    let sources: Vec<&str> = page["dependencyInfo"]["forwardReferences"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["source"].as_str().unwrap())
        .collect();
    assert_eq!(sources, vec!["./a", "./b", "./c", "./d"]);
    for _ in 0..5 {
        assert_eq!(first, record(&run(dir.path(), &config).unwrap()));
    }
}
