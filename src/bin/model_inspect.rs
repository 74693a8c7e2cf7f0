use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use rustmemorm::shape::{DomainResult, ShapeBuilder, SqlSelectionCollector};
use rustmemorm::{BootModel, ModelConfig, RuntimeModel};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "model-inspect")]
#[command(about = "Developer tooling for RustMemORM mapping documents")]
struct Cli {
    /// JSON boot mapping document
    #[arg(long)]
    mapping: PathBuf,

    #[arg(long, default_value_t = 3)]
    max_fetch_depth: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print hierarchies, managed types with state-array positions, and tables
    Model,
    /// Print the result shape and selected columns of one entity query
    Shape {
        #[arg(long)]
        entity: String,
        #[arg(long, default_value = "e")]
        alias: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let model = load_model(&cli.mapping, cli.max_fetch_depth)?;

    match cli.command {
        Command::Model => print_model(&model),
        Command::Shape { entity, alias } => print_shape(&model, &entity, &alias),
    }
}

fn load_model(path: &Path, max_fetch_depth: usize) -> Result<RuntimeModel> {
    let document = fs::read_to_string(path)
        .with_context(|| format!("failed to read mapping document {}", path.display()))?;
    let boot = BootModel::from_json(&document).context("invalid mapping document")?;
    let config = ModelConfig::default().max_fetch_depth(max_fetch_depth);
    RuntimeModel::build(&boot, config).map_err(|e| anyhow!("model resolution failed: {}", e))
}

fn print_model(model: &RuntimeModel) -> Result<()> {
    println!("Hierarchies:");
    for hierarchy in model.hierarchies() {
        let root = model.managed_type(hierarchy.root_entity);
        println!(
            "  {} [{:?}] id={} versioned={} cached={} polymorphic={}",
            root.name,
            hierarchy.strategy,
            hierarchy.identifier.kind_name(),
            hierarchy.is_versioned(),
            hierarchy.is_cached(),
            hierarchy.is_polymorphic()
        );
    }

    println!("Managed types:");
    for descriptor in model.managed_types() {
        println!("  {} ({})", descriptor.name, descriptor.kind_name());
        for attribute in descriptor.attributes() {
            println!(
                "    [{}] {} : {}",
                attribute.position,
                attribute.name,
                attribute.kind_name()
            );
        }
    }

    println!("Tables:");
    let relational = model.relational();
    for table in relational.tables() {
        let columns: Vec<String> = table
            .columns()
            .iter()
            .map(|column| relational.column(*column).name.clone())
            .collect();
        println!("  {} [{:?}] ({})", table.name, table.kind, columns.join(", "));
    }
    Ok(())
}

fn print_shape(model: &RuntimeModel, entity: &str, alias: &str) -> Result<()> {
    let mut collector = SqlSelectionCollector::new();
    let shape = {
        let mut builder = ShapeBuilder::new(model, &mut collector);
        builder
            .add_entity_result(entity, alias)
            .map_err(|e| anyhow!("cannot build shape for {}: {}", entity, e))?;
        builder.build()
    };

    for result in shape.results() {
        if let DomainResult::Entity(root) = result {
            println!("{} (frame {})", root.path, root.frame);
        }
    }
    for (depth, fetch) in shape.walk() {
        println!("{}{} <{}>", "  ".repeat(depth + 1), fetch.path().local_name(), fetch.kind_name());
    }

    println!("Columns:");
    for (position, label) in collector.labels().iter().enumerate() {
        println!("  {:>3} {}", position, label);
    }
    Ok(())
}
