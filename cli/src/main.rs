use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use hcm::parser::MODULE_DESCRIPTOR;
use hcm::{
    ArchiveConfigurationReader, AutoExportConfig, AutoExportModuleWriter, ConfigurationModel,
    DefinitionMergeService, FileConfigurationWriter, Module, PathConfigurationReader,
};

#[derive(Parser)]
#[command(name = "hcm", version, about = "Read, validate, rewrite and merge configuration modules")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read all modules and build the configuration model
    Validate {
        #[arg(long, env = "HCM_PROJECT")]
        project: PathBuf,

        /// Additional module archives (zip or jar)
        #[arg(long = "archive")]
        archives: Vec<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rewrite all modules of a project into another directory
    Write {
        #[arg(long, env = "HCM_PROJECT")]
        project: PathBuf,

        #[arg(long)]
        out: PathBuf,
    },
    /// Merge a module of changed definitions into the project's modules
    Merge {
        /// Defaults to the project root of the auto-export settings
        #[arg(long, env = "HCM_PROJECT")]
        project: Option<PathBuf>,

        /// Auto-export settings (YAML)
        #[arg(long)]
        config: PathBuf,

        /// Directory holding the changes module's hcm-module.yaml
        #[arg(long)]
        changes: PathBuf,

        /// Merge without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "hcm=debug" } else { "hcm=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber).context("Failed to install tracing subscriber")?;
    tracing_log::LogTracer::init().context("Failed to route log records to tracing")?;
    Ok(())
}

fn read_project(project: &Path) -> Result<Vec<Module>> {
    PathConfigurationReader::with_project_root(project)
        .read_project()
        .with_context(|| format!("Failed to read modules from {}", project.display()))
}

fn validate(project: &Path, archives: &[PathBuf], json: bool) -> Result<()> {
    let mut modules = read_project(project)?;
    for archive in archives {
        let read = ArchiveConfigurationReader::new(archive)
            .read()
            .with_context(|| format!("Failed to read archive {}", archive.display()))?;
        modules.extend(read);
    }
    let model = ConfigurationModel::from_modules(modules).context("Configuration model is invalid")?;

    let summary = serde_json::json!({
        "modules": model.modules().iter().map(|m| m.key().to_string()).collect::<Vec<_>>(),
        "groups": model.groups(),
        "namespaces": model.namespaces().len(),
        "contentDefinitions": model.content_definitions().len(),
        "nodes": model.descendant_ids(model.root_id()).len(),
    });
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "OK: {} modules, {} namespaces, {} config nodes, {} content definitions",
            model.modules().len(),
            model.namespaces().len(),
            summary["nodes"],
            model.content_definitions().len()
        );
    }
    Ok(())
}

fn write(project: &Path, out: &Path) -> Result<()> {
    let mut modules = read_project(project)?;
    ConfigurationModel::from_modules(modules.clone()).context("Configuration model is invalid")?;
    FileConfigurationWriter::new(out)
        .write(&mut modules)
        .with_context(|| format!("Failed to write modules to {}", out.display()))?;
    println!("Wrote {} modules to {}", modules.len(), out.display());
    Ok(())
}

fn merge(project: Option<PathBuf>, config: &Path, changes: &Path, dry_run: bool) -> Result<()> {
    let settings = AutoExportConfig::load(config)
        .with_context(|| format!("Failed to load auto-export settings from {}", config.display()))?;
    let Some(project) = project.or_else(|| settings.project_root.clone()) else {
        bail!("No project root given and none configured in {}", config.display());
    };

    let modules = read_project(&project)?;
    let baseline = ConfigurationModel::from_modules(modules.clone()).context("Configuration model is invalid")?;
    let changes = PathConfigurationReader::new()
        .read_module(&changes.join(MODULE_DESCRIPTOR))
        .with_context(|| format!("Failed to read changes module from {}", changes.display()))?;

    let mapped: Vec<&str> = settings.modules.iter().map(|m| m.mvn_path.as_str()).collect();
    let to_merge: Vec<&Module> = modules
        .iter()
        .filter(|m| m.mvn_path().is_some_and(|p| mapped.contains(&p)))
        .collect();
    if to_merge.is_empty() {
        bail!("None of the configured modules ({}) exist below {}", mapped.join(", "), project.display());
    }

    let service = DefinitionMergeService::new(&settings)?;
    let mut merged = service.merge_changes_to_modules(&changes, to_merge, &baseline)?;
    baseline
        .rebuild(merged.iter())
        .context("Merged modules do not form a valid configuration model")?;

    let writer = AutoExportModuleWriter::new();
    let mut written = 0;
    for module in merged.iter_mut().filter(|m| m.has_changes()) {
        if dry_run {
            println!("Would update module {}", module.key());
            continue;
        }
        writer
            .write_in_place(module)
            .with_context(|| format!("Failed to write module {}", module.key()))?;
        println!("Updated module {}", module.key());
        written += 1;
    }
    if !dry_run {
        println!("{} of {} modules changed", written, merged.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Validate {
            project,
            archives,
            json,
        } => validate(&project, &archives, json),
        Command::Write { project, out } => write(&project, &out),
        Command::Merge {
            project,
            config,
            changes,
            dry_run,
        } => merge(project, &config, &changes, dry_run),
    }
}
