use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ertdata_loader::{
    ConnectionProvider, DataLoader, LoaderConfig, Lookup, ServerFileProvider, StaticConnection, load_config_from_path,
};
use ertdata_types::ConnectionInfo;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "ertdata", version, about = "Query an ert experiment storage server")]
struct Cli {
    /// Storage server base URL; bypasses project lookup.
    #[arg(long, global = true, conflicts_with = "project")]
    url: Option<String>,

    /// Token sent with every request when `--url` is given.
    #[arg(long, global = true, requires = "url")]
    token: Option<String>,

    /// Project directory holding `storage_server.json`.
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Loader configuration file (JSON).
    #[arg(long, global = true, default_value = "ertdata.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// All ensembles of all experiments.
    Ensembles,
    /// Experiments with their ensembles.
    Experiments,
    Ensemble { id: String },
    /// Response and parameter names of an ensemble.
    Outline { id: String },
    Responses { id: String },
    Userdata { id: String },
    Parameters { id: String },
    Labels { id: String, name: String },
    Priors { experiment_id: String },
    /// Parameter values per realization; `NAME::LABEL` selects a label.
    Parameter { id: String, name: String },
    /// Record values per realization.
    Record { id: String, name: String },
    Observations { id: String, name: String },
    Misfit {
        id: String,
        response: String,
        #[arg(long)]
        summary: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config_from_path(&cli.config)?;

    let provider = connection_provider(&cli, &config)?;
    let lookup = Lookup::from_config(&config, provider).context("building HTTP client")?;
    let project = cli.project.as_deref().map(|path| path.to_string_lossy().into_owned());
    let client = lookup.get_client(project.as_deref())?;
    debug!(base_url = %client.key().base_url(), command = ?cli.command, "running command");

    run_command(&client, cli.command).await
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn connection_provider(cli: &Cli, config: &LoaderConfig) -> Result<Arc<dyn ConnectionProvider>> {
    if let Some(url) = &cli.url {
        let info = ConnectionInfo::new(url.clone(), cli.token.clone())?;
        return Ok(Arc::new(StaticConnection(info)));
    }
    if cli.project.is_none() && config.project_dir.is_none() {
        bail!("either --url or --project is required (or set projectDir in {})", cli.config.display());
    }
    Ok(Arc::new(ServerFileProvider::new(config.project_dir.clone())))
}

async fn run_command(client: &DataLoader, command: Command) -> Result<()> {
    match command {
        Command::Ensembles => print_json(&client.list_all_ensembles().await),
        Command::Experiments => print_json(&client.list_experiments().await),
        Command::Ensemble { id } => print_json(&client.get_ensemble(&id).await),
        Command::Outline { id } => print_json(&client.get_ensemble_outline(&id).await),
        Command::Responses { id } => print_json(&client.get_ensemble_responses(&id).await),
        Command::Userdata { id } => print_json(&client.get_ensemble_userdata(&id).await),
        Command::Parameters { id } => print_json(&client.get_ensemble_parameters(&id).await),
        Command::Labels { id, name } => print_json(&client.get_record_labels(&id, &name).await),
        Command::Priors { experiment_id } => print_json(&client.get_experiment_priors(&experiment_id).await),
        Command::Parameter { id, name } => print_json(&client.get_parameter_data(&id, &name).await),
        Command::Record { id, name } => print_json(&client.get_record_data(&id, &name).await),
        Command::Observations { id, name } => print_json(&client.get_record_observations(&id, &name).await),
        Command::Misfit { id, response, summary } => print_json(&client.compute_misfit(&id, &response, summary).await),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_line_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn misfit_summary_flag_parses() {
        let cli = Cli::try_parse_from(["ertdata", "--url", "http://localhost:8000", "misfit", "e1", "FOPR", "--summary"])
            .unwrap();

        assert_eq!(cli.url.as_deref(), Some("http://localhost:8000"));
        assert!(matches!(cli.command, Command::Misfit { summary: true, .. }));
    }

    #[test]
    fn token_requires_url() {
        assert!(Cli::try_parse_from(["ertdata", "--token", "t", "ensembles"]).is_err());
    }

    #[test]
    fn static_url_builds_static_provider() {
        let cli = Cli::try_parse_from(["ertdata", "--url", "http://storage.local", "--token", "t", "ensembles"]).unwrap();

        let provider = connection_provider(&cli, &LoaderConfig::default()).unwrap();
        let info = provider.resolve(Some("ignored")).unwrap();

        assert_eq!(info.base_url, "http://storage.local");
        assert_eq!(info.token.as_deref(), Some("t"));
    }

    #[test]
    fn missing_connection_source_is_reported() {
        let cli = Cli::try_parse_from(["ertdata", "experiments"]).unwrap();

        assert!(connection_provider(&cli, &LoaderConfig::default()).is_err());
    }
}
