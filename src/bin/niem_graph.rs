//! NIEM Graph CLI
//!
//! Classifies schema indexes and projects instance documents into graph
//! deltas from the command line.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use niem_graph::document::DocumentFormat;
use niem_graph::{
    Batch, ClassificationTable, Engine, IngestionResult, MappingConfig, SchemaIndex, SelectionSet,
    SourceDocument,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "niem-graph")]
#[command(about = "Project NIEM instance documents into a property graph")]
struct Cli {
    /// Explicit config file (layered over niem-graph.toml and NIEM_GRAPH__* variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a classification table from a schema index
    Classify {
        /// Schema index JSON
        schema_index: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ingest documents and write the graph delta as JSON
    Project {
        #[command(flatten)]
        ingest: IngestArgs,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fail when any node is unreachable from a document root
        #[arg(long)]
        strict: bool,
    },

    /// Ingest documents and write the graph as GraphViz DOT
    Dot {
        #[command(flatten)]
        ingest: IngestArgs,

        /// Output file (defaults to graph.dot)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// Classification table JSON
    #[arg(short, long)]
    table: PathBuf,

    /// Selection set JSON (qname -> bool); everything selectable by default
    #[arg(short, long)]
    selection: Option<PathBuf>,

    /// Documents or directories of documents, ingested as one batch
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = MappingConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Classify { schema_index, output } => {
            let index = SchemaIndex::load(&schema_index)
                .with_context(|| format!("reading schema index {:?}", schema_index))?;
            let table = ClassificationTable::from_schema_index(&index);
            eprintln!("Classified {} element(s)", table.len());
            write_output(output.as_deref(), &table.to_json()?)
        }

        Commands::Project { ingest, output, strict } => {
            if strict {
                config.validation.strict_orphans = true;
            }
            let result = ingest_batch(&ingest, config)?;
            report(&result);
            write_output(output.as_deref(), &serde_json::to_string_pretty(&result)?)?;
            if !result.is_clean() {
                std::process::exit(2);
            }
            Ok(())
        }

        Commands::Dot { ingest, output } => {
            let result = ingest_batch(&ingest, config)?;
            report(&result);
            let output = output.unwrap_or_else(|| PathBuf::from("graph.dot"));
            std::fs::write(&output, result.delta.to_dot())?;
            eprintln!("Exported DOT to: {:?}", output);
            Ok(())
        }
    }
}

fn ingest_batch(args: &IngestArgs, config: MappingConfig) -> anyhow::Result<IngestionResult> {
    let table = ClassificationTable::load(&args.table)
        .with_context(|| format!("reading classification table {:?}", args.table))?;
    let selection = match &args.selection {
        Some(path) => SelectionSet::load(path).with_context(|| format!("reading selection set {:?}", path))?,
        None => SelectionSet::new(),
    };

    let mut batch = Batch::new();
    for path in collect_documents(&args.inputs)? {
        batch.push(SourceDocument::from_path(&path).with_context(|| format!("reading {:?}", path))?);
    }
    if batch.is_empty() {
        bail!("no XML or JSON documents found in the given inputs");
    }
    info!(documents = batch.len(), "collected batch");

    let engine = Engine::new(table, selection, config);
    Ok(engine.ingest(&batch)?)
}

/// Expand directories into the XML/JSON files below them, sorted for a stable batch order
fn collect_documents(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut documents = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| DocumentFormat::from_path(p).is_some())
                .collect();
            found.sort();
            documents.extend(found);
        } else if input.is_file() {
            documents.push(input.clone());
        } else {
            bail!("input not found: {:?}", input);
        }
    }
    Ok(documents)
}

fn report(result: &IngestionResult) {
    eprintln!(
        "Projected {} node(s), {} edge(s)",
        result.delta.node_count(),
        result.delta.edge_count()
    );
    for failure in &result.failures {
        eprintln!("  ❌ {} at {}: {}", failure.document, failure.location, failure.message);
    }
    if !result.diagnostics.is_empty() {
        eprint!("{}", result.diagnostics);
    }
}

fn write_output(path: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content).with_context(|| format!("writing {:?}", path))?;
            eprintln!("✅ Wrote {:?}", path);
        }
        None => println!("{}", content),
    }
    Ok(())
}
