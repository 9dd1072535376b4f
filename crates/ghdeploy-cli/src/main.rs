//! ghdeploy - register a Pulumi Cloud deployment for the current GitHub checkout
//!
//! Usage:
//!   ghdeploy construct --org acme --project widget --stack prod
//!   ghdeploy resolve           # Show what would be registered
//!   ghdeploy describe          # Show the component schema

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ghdeploy_core::config::DeployConfig;
use ghdeploy_core::deployment::{DeploymentAssembler, DeploymentService, ResolvedSource, StackRef};
use ghdeploy_core::exec::SystemExecutor;
use ghdeploy_core::provider::{self, GitHubArgs, GitHubComponent, GitHubOutputs, LocalRegistry};
use ghdeploy_core::repo_dir::LocalFs;
use ghdeploy_core::service::PulumiServiceClient;

#[derive(Parser)]
#[command(name = "ghdeploy")]
#[command(about = "Pulumi Cloud deployments for GitHub checkouts", long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register deployment settings for the current checkout
    Construct {
        /// Pulumi organization
        #[arg(long, env = "PULUMI_ORGANIZATION")]
        org: String,

        /// Pulumi project
        #[arg(long, env = "PULUMI_PROJECT")]
        project: String,

        /// Pulumi stack
        #[arg(long, env = "PULUMI_STACK")]
        stack: String,

        /// Name of the component resource
        #[arg(long, default_value = "github")]
        name: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Resolve repository, default branch and repo dir without registering
    Resolve {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the component's type token and schema metadata
    Describe {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "ghdeploy=debug,info"
    } else {
        "ghdeploy=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Construct {
            org,
            project,
            stack,
            name,
            format,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let token = config.require_access_token()?.to_string();
            let service = PulumiServiceClient::new(config.api_url()?, token)?;
            let assembler = build_assembler(&config, Arc::new(service));
            let component = GitHubComponent::new(assembler, Arc::new(LocalRegistry::new()))
                .with_registration_order(config.registration);
            let stack = StackRef::new(org, project, stack);

            let outputs = component
                .construct(&cancel, &name, &stack, GitHubArgs::default())
                .await
                .with_context(|| format!("failed to register deployment for {stack}"))?;
            print_construct_result(&stack, &outputs, format)?;
        }
        Commands::Resolve { format } => {
            let config = load_config(cli.config.as_deref())?;
            // Resolution never contacts the service, so a token is optional here.
            let token = config.access_token.clone().unwrap_or_default();
            let service = PulumiServiceClient::new(config.api_url()?, token)?;
            let assembler = build_assembler(&config, Arc::new(service));

            let source = assembler
                .resolve(&cancel)
                .await
                .context("failed to resolve deployment source")?;
            print_source(&source, format)?;
        }
        Commands::Describe { format } => print_schema(format)?,
    }

    Ok(())
}

fn load_config(explicit: Option<&std::path::Path>) -> Result<DeployConfig> {
    let config = DeployConfig::load(explicit).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn build_assembler(
    config: &DeployConfig,
    service: Arc<dyn DeploymentService>,
) -> DeploymentAssembler {
    let mut executor = SystemExecutor::new();
    if let Some(timeout) = config.command_timeout() {
        executor = executor.with_timeout(timeout);
    }
    DeploymentAssembler::new(Arc::new(executor), Arc::new(LocalFs), service)
        .with_git_program(config.git_program.clone())
        .with_gh_program(config.gh_program.clone())
}

fn print_construct_result(
    stack: &StackRef,
    outputs: &GitHubOutputs,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("✓ Registered deployment for {stack}");
            println!("  {}: {}", provider::DEPLOYMENT_ID_OUTPUT, outputs.deployment_id);
            println!("  Component: {}", outputs.handle.urn_suffix());
            print_source_rows(&outputs.source);
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "stack": stack,
                "outputs": outputs,
                "source": outputs.source,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_source(source: &ResolvedSource, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_source_rows(source),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(source)?),
    }
    Ok(())
}

fn print_source_rows(source: &ResolvedSource) {
    let branch = if source.branch.is_empty() {
        "(none)"
    } else {
        source.branch.as_str()
    };
    let repo_dir = if source.repo_dir.is_empty() {
        ".".to_string()
    } else {
        source.repo_dir.to_string()
    };
    println!("  {:<12} {}", "Repository", source.repo);
    println!("  {:<12} {}", "Branch", branch);
    println!("  {:<12} {}", "Directory", repo_dir);
}

fn print_schema(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{} ({})", provider::TYPE_TOKEN, provider::DISPLAY_NAME);
            println!("  Publisher: {}", provider::PUBLISHER);
            println!(
                "  Output {}: string, {}",
                provider::DEPLOYMENT_ID_OUTPUT,
                provider::DEPLOYMENT_ID_DESCRIPTION
            );
            println!();
            println!("{}", provider::DESCRIPTION);
        }
        OutputFormat::Json => {
            let mut outputs = serde_json::Map::new();
            outputs.insert(
                provider::DEPLOYMENT_ID_OUTPUT.to_string(),
                serde_json::json!({
                    "type": "string",
                    "description": provider::DEPLOYMENT_ID_DESCRIPTION,
                }),
            );
            let output = serde_json::json!({
                "type": provider::TYPE_TOKEN,
                "displayName": provider::DISPLAY_NAME,
                "publisher": provider::PUBLISHER,
                "description": provider::DESCRIPTION,
                "inputProperties": {},
                "outputs": outputs,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
