use std::path::Path;

use serde::Serialize;

use codewise_graph::emit::{EmitStats, ProjectSummary};
use codewise_graph::pipeline::RunReport;
use codewise_graph::resolver::Resolution;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexOutput<'a> {
    output_dir: &'a Path,
    elapsed_secs: f64,
    emitted: EmitStats,
    #[serde(flatten)]
    summary: &'a ProjectSummary,
}

/// Print the summary of an indexing run.
///
/// - `json = true`: a pretty-printed JSON object on stdout.
/// - `json = false`: a cargo-style human-readable summary on stdout.
///
/// Failed files are listed on **stderr** so stdout stays clean for
/// downstream JSON consumers.
pub fn print_summary(report: &RunReport, json: bool) {
    let summary = &report.summary;
    if json {
        let out = IndexOutput {
            output_dir: &report.output_dir,
            elapsed_secs: report.elapsed_secs,
            emitted: report.emitted,
            summary,
        };
        match serde_json::to_string_pretty(&out) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("error serialising summary: {e}"),
        }
    } else {
        println!(
            "Indexed {} of {} files in {:.2}s",
            summary.successful_files, summary.total_files, report.elapsed_secs
        );
        println!(
            "  {} definitions ({} top-level, {} nested)",
            summary.total_definitions, summary.top_level_definitions, summary.nested_definitions
        );
        let kinds: Vec<String> = summary
            .per_kind
            .iter()
            .map(|(kind, count)| format!("{count} {}", kind.as_str()))
            .collect();
        if !kinds.is_empty() {
            println!("  {}", kinds.join(", "));
        }
        let links = &summary.links;
        println!(
            "  {} forward edges: {} linked, {} same-file, {} file-level, {} external, {} unresolved",
            links.total(),
            links.linked,
            links.same_file,
            links.file_level,
            links.external,
            links.unresolved
        );
        println!(
            "  Wrote {} records to {}",
            report.emitted.definition_records,
            report.output_dir.display()
        );
    }

    if !summary.collisions.is_empty() {
        eprintln!("  {} qualified name collisions", summary.collisions.len());
        for collision in &summary.collisions {
            eprintln!("    {collision}");
        }
    }
    if summary.has_failures() {
        eprintln!("  {} files failed", summary.failed_files);
        for failure in &summary.errors {
            eprintln!("    {}: {}", failure.path, failure.message);
        }
    }
}

#[derive(Serialize)]
struct ResolveOutput<'a> {
    specifier: &'a str,
    from: &'a str,
    #[serde(flatten)]
    resolution: &'a Resolution,
}

/// Print one module resolution.
pub fn print_resolution(specifier: &str, from: &str, resolution: &Resolution, json: bool) {
    if json {
        let out = ResolveOutput {
            specifier,
            from,
            resolution,
        };
        match serde_json::to_string_pretty(&out) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("error serialising resolution: {e}"),
        }
        return;
    }
    match resolution.resolved_path() {
        Some(path) => println!("{specifier} -> {path}"),
        None => println!("{specifier} -> {}", resolution.label()),
    }
}
