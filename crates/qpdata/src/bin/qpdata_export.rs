use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use qpdata::{
    graph_to_json, read_container, write_report, ContainerOptions, DecodeLimits, ExportOptions,
    Project, ProjectOptions,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Export annotations, classifications and summaries from a QuPath project.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Project directory (containing project.qpproj), or a single .qpdata file
    path: PathBuf,

    /// Directory to write the export into
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Log progress and per-image details
    #[arg(short, long)]
    verbose: bool,

    /// Also write a GeoJSON FeatureCollection of annotation shapes
    #[arg(long)]
    geojson: bool,

    /// Also write each decoded object graph as JSON
    #[arg(long)]
    dump_graph: bool,

    /// GeoJSON classification of unclassified annotations (default: "(aucune)")
    #[arg(long)]
    unclassified_label: Option<String>,

    /// Worker threads for decoding images (default: one per core)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Maximum object nesting accepted while decoding
    #[arg(long)]
    max_depth: Option<usize>,

    /// Maximum handles accepted while decoding
    #[arg(long)]
    max_handles: Option<u64>,
}

impl Cli {
    fn limits(&self) -> DecodeLimits {
        let mut limits = DecodeLimits::default();
        if let Some(depth) = self.max_depth {
            limits = limits.max_depth(depth);
        }
        if let Some(handles) = self.max_handles {
            limits = limits.max_handles(handles);
        }
        limits
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; RUST_LOG overrides the defaults.
    let default = if cli.verbose {
        "warn,qpdata=info,qpdata_object_stream=info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let container = ContainerOptions {
        limits: cli.limits(),
        ..ContainerOptions::default()
    };

    if cli.path.is_file() {
        let stack_size = container.limits.stack_size();
        return std::thread::scope(|scope| {
            let worker = std::thread::Builder::new()
                .name("inspect".into())
                .stack_size(stack_size)
                .spawn_scoped(scope, || inspect_file(&cli, &container))
                .context("failed to start decoding thread")?;
            match worker.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow!("decoding thread panicked")),
            }
        });
    }

    let project = Project::open(&cli.path)
        .with_context(|| format!("failed to open project {}", cli.path.display()))?;
    let report = project.analyze(&ProjectOptions {
        container,
        jobs: cli.jobs,
        dump_graph: cli.dump_graph,
    });
    let paths = write_report(
        &report,
        &cli.output,
        &ExportOptions {
            geojson: cli.geojson,
            dump_graph: cli.dump_graph,
            unclassified_label: cli.unclassified_label.clone(),
        },
    )?;

    info!(
        images = report.images.len(),
        failed = report.failed_images(),
        annotations = report.total_annotations(),
        export = %paths.export.display(),
        "project analysis complete"
    );
    println!(
        "{} images, {} annotations, exported to {}",
        report.images.len(),
        report.total_annotations(),
        paths.export.display()
    );
    Ok(())
}

/// Decodes one container and prints its records as JSON on stdout.
fn inspect_file(cli: &Cli, options: &ContainerOptions) -> Result<()> {
    let decoded = read_container(&cli.path, options)?;
    if let Some(err) = &decoded.error {
        tracing::warn!(%err, "hierarchy not decoded");
    }
    let graph = if cli.dump_graph {
        decoded.graph.as_ref().map(graph_to_json)
    } else {
        None
    };
    let walk = decoded.walk.unwrap_or_default();
    let out = serde_json::json!({
        "version": decoded.segments.version_text,
        "metadata": decoded.metadata,
        "hierarchy": walk.summary,
        "annotations": walk.records,
        "warnings": walk.warnings,
        "diagnostics": decoded.diagnostics.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "error": decoded.error.as_ref().map(ToString::to_string),
        "graph": graph,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
