//! Command-line front end of the template registry.
//!
//! # Responsibility
//! - Open the configured store, run registry startup, then execute one
//!   maintenance command.
//! - Keep output line-oriented for scripting.

use clap::{Parser, Subcommand};
use etl_templates_core::db::open_db;
use etl_templates_core::{
    core_version, init_from_config, JsonBundledSource, RegistryConfig, SqliteTemplateRepository,
    TemplateManager,
};
use log::error;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "etl-templates", about = "Inspect and maintain the component template registry")]
struct Cli {
    /// Registry configuration (JSON).
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// JSON array of bundled template definitions.
    #[arg(long, short = 'b')]
    bundled: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every template with its kind and resolved core.
    List,
    /// Print the stored statements of one template.
    Show { iri: String },
    /// Remove a reference template.
    Remove { iri: String },
    /// Print the core crate version.
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if let Command::Version = cli.command {
        println!("etl_templates_core version={}", core_version());
        return Ok(());
    }

    let config_path = cli.config.ok_or("--config is required")?;
    let bundled_path = cli.bundled.ok_or("--bundled is required")?;
    let config = RegistryConfig::load(&config_path)?;
    init_from_config(&config)?;

    let repository = SqliteTemplateRepository::try_new(open_db(&config.database_path)?)?;
    let manager = TemplateManager::new(repository, &config);
    let report = manager.initialize(&JsonBundledSource::new(bundled_path))?;
    for skipped in &report.load.skipped {
        eprintln!("skipped: {skipped}");
    }

    match cli.command {
        Command::List => {
            for (iri, template) in manager.get_templates().iter() {
                let kind = template.kind().as_str();
                match template.as_reference() {
                    None => println!("{kind}\t{iri}"),
                    Some(reference) => println!(
                        "{kind}\t{iri}\tparent={}\tcore={}",
                        reference.parent_iri,
                        reference.core_iri.as_deref().unwrap_or("-")
                    ),
                }
            }
        }
        Command::Show { iri } => {
            let template = manager
                .get_template(&iri)
                .ok_or_else(|| format!("unknown template `{iri}`"))?;
            for (section, statements) in [
                ("interface", manager.get_interface(&template)?),
                ("config", manager.get_config(&template)?),
                ("description", manager.get_description(&template)?),
            ] {
                println!("# {section}");
                for statement in statements {
                    println!("{statement}");
                }
            }
        }
        Command::Remove { iri } => {
            let template = manager
                .get_template(&iri)
                .ok_or_else(|| format!("unknown template `{iri}`"))?;
            manager.remove(&template)?;
            println!("removed\t{iri}");
        }
        Command::Version => {}
    }
    Ok(())
}
