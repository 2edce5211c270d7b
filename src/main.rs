mod cli;
mod output;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use codewise_graph::config::GraphConfig;
use codewise_graph::logging::init_logger;
use codewise_graph::pipeline::{build_resolver, run};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Index(args) => {
            let mut config = GraphConfig::load(&args.path);
            args.apply(&mut config);
            let report = run(&args.path, &config)
                .with_context(|| format!("indexing {} failed", args.path.display()))?;
            output::print_summary(&report, args.json);
        }
        Commands::Resolve {
            path,
            from,
            specifier,
            aliases,
            json,
        } => {
            let root = path
                .canonicalize()
                .with_context(|| format!("cannot open project root {}", path.display()))?;
            let mut config = GraphConfig::load(&root);
            config.aliases.extend(aliases);
            let resolver = build_resolver(&root, &config);
            let from = project_relative(&root, &from);
            let resolution = resolver.resolve(&specifier, &from);
            output::print_resolution(&specifier, &from, &resolution, json);
        }
    }

    Ok(())
}

/// Accept the importing file either project-relative or as an absolute path
/// inside the project.
fn project_relative(root: &Path, from: &str) -> String {
    let path = Path::new(from);
    let rel = path.strip_prefix(root).unwrap_or(path);
    codewise_graph::resolver::slash_path(rel)
}
