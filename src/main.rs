use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use aws_config::BehaviorVersion;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tracing::info;

use lambda_agent_cli::api::DashboardClient;
use lambda_agent_cli::config::InstallOptions;
use lambda_agent_cli::error::InstrumentError;
use lambda_agent_cli::layers::{LayerCandidate, LayerDirectory};
use lambda_agent_cli::patch::InstallState;
use lambda_agent_cli::runtimes::HandlerVariant;
use lambda_agent_cli::vendor::Vendor;
use lambda_agent_cli::{subscriptions, AwsClients};

#[derive(Parser)]
#[command(
    name = "lambda-agent",
    version,
    about = "Install and manage serverless monitoring agents on AWS Lambda functions"
)]
struct Cli {
    /// AWS region (defaults to the profile/environment region)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    vendor: VendorCommand,
}

#[derive(Subcommand)]
enum VendorCommand {
    /// Manage the IOpipe agent
    Iopipe {
        #[command(subcommand)]
        command: AgentCommand,
    },
    /// Manage the New Relic agent
    Newrelic {
        #[command(subcommand)]
        command: AgentCommand,
    },
}

#[derive(Subcommand)]
enum AgentCommand {
    /// Install the agent on one or more functions
    Install(InstallArgs),
    /// Remove the agent and restore the original handler
    Uninstall {
        #[arg(long = "function", required = true)]
        functions: Vec<String>,
    },
    /// Show the install state of every function in the region
    List,
    /// Forward function logs to the vendor's ingestion function
    Subscribe {
        #[arg(long = "function", required = true)]
        functions: Vec<String>,
        /// ARN of the log-ingestion function
        #[arg(long)]
        destination_arn: String,
    },
    /// Stop forwarding function logs
    Unsubscribe {
        #[arg(long = "function", required = true)]
        functions: Vec<String>,
    },
    /// Link an AWS account to the vendor dashboard
    LinkAccount {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        aws_account_id: String,
        /// Integration role the dashboard assumes to read telemetry
        #[arg(long)]
        role_arn: String,
        /// Display name for the linked account
        #[arg(long)]
        name: String,
    },
}

#[derive(Args)]
struct InstallArgs {
    #[arg(long = "function", required = true)]
    functions: Vec<String>,

    /// Explicit layer version ARN, skipping layer discovery
    #[arg(long)]
    layer_arn: Option<String>,

    /// IOpipe project token
    #[arg(long)]
    token: Option<String>,

    /// New Relic account id
    #[arg(long)]
    account_id: Option<String>,

    #[arg(long)]
    license_key: Option<String>,

    /// Dashboard API key, used to look up the license key when
    /// --license-key is not given
    #[arg(long)]
    api_key: Option<String>,

    /// Reapply even if the agent is already installed
    #[arg(long)]
    upgrade: bool,

    /// Wrapper flavor for Java runtimes: request or stream
    #[arg(long)]
    java_handler: Option<String>,

    /// Enable the telemetry extension
    #[arg(long)]
    enable_extension: bool,

    /// Ship function logs through the extension
    #[arg(long)]
    send_function_logs: bool,

    /// Delimited key:value pairs attached to the function's telemetry
    #[arg(long)]
    tags: Option<String>,

    #[arg(long)]
    env_delimiter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    lambda_agent_cli::set_up_logging(cli.verbose);

    info!(
        "Initializing {} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let (vendor, command) = match cli.vendor {
        VendorCommand::Iopipe { command } => (Vendor::IoPipe, command),
        VendorCommand::Newrelic { command } => (Vendor::NewRelic, command),
    };

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = cli.region.clone() {
        loader = loader.region(aws_config::Region::new(region));
    }
    let sdk_config = loader.load().await;
    let clients = AwsClients::new(&sdk_config);

    match command {
        AgentCommand::Install(args) => {
            let region = sdk_config
                .region()
                .map(ToString::to_string)
                .context("no AWS region configured; pass --region")?;
            run_install(&clients, vendor, &region, args).await
        }
        AgentCommand::Uninstall { functions } => run_uninstall(&clients, vendor, functions).await,
        AgentCommand::List => run_list(&clients, vendor).await,
        AgentCommand::Subscribe {
            functions,
            destination_arn,
        } => {
            for function in &functions {
                subscriptions::ensure_subscription(&clients.logs, vendor, function, &destination_arn)
                    .await?;
                println!("{function}: logs subscribed");
            }
            Ok(())
        }
        AgentCommand::Unsubscribe { functions } => {
            for function in &functions {
                subscriptions::remove_subscription(&clients.logs, vendor, function).await?;
                println!("{function}: logs unsubscribed");
            }
            Ok(())
        }
        AgentCommand::LinkAccount {
            api_key,
            aws_account_id,
            role_arn,
            name,
        } => run_link_account(vendor, api_key, &aws_account_id, &role_arn, &name).await,
    }
}

async fn run_install(
    clients: &AwsClients,
    vendor: Vendor,
    region: &str,
    args: InstallArgs,
) -> Result<()> {
    let java_variant = args
        .java_handler
        .as_deref()
        .map(HandlerVariant::from_str)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    let options = InstallOptions {
        layer_arn: args.layer_arn,
        token: args.token,
        account_id: args.account_id,
        license_key: args.license_key,
        upgrade: args.upgrade,
        java_variant,
        enable_extension: args.enable_extension,
        extension_send_logs: args.send_function_logs,
        tags: args.tags,
        env_delimiter: args.env_delimiter,
    }
    .resolve_credentials();

    // An extension install needs the license key; fall back to the
    // dashboard lookup when only an API key was provided.
    let options = if vendor == Vendor::NewRelic
        && options.enable_extension
        && options.license_key.is_none()
    {
        let api_key = args
            .api_key
            .or_else(|| env::var(vendor.api_key_env()).ok().filter(|key| !key.is_empty()));
        match (api_key, &options.account_id) {
            (Some(api_key), Some(account_id)) => {
                let account_id = account_id
                    .parse::<i64>()
                    .with_context(|| format!("account id {account_id} is not numeric"))?;
                let dashboard = DashboardClient::new(vendor, api_key)?;
                let license_key = dashboard.license_key(account_id).await?.to_string();
                InstallOptions {
                    license_key: Some(license_key),
                    ..options
                }
            }
            _ => options,
        }
    } else {
        options
    };

    let directory = LayerDirectory::new(vendor, region)?;

    if let [function] = args.functions.as_slice() {
        let update = match lambda_agent_cli::install(clients, &directory, vendor, function, &options)
            .await
        {
            Ok(update) => update,
            Err(err) => match err.downcast_ref::<InstrumentError>() {
                Some(InstrumentError::AmbiguousLayer(candidates)) if io::stdin().is_terminal() => {
                    let layer_arn = choose_layer(candidates)?;
                    let options = InstallOptions {
                        layer_arn: Some(layer_arn),
                        ..options
                    };
                    lambda_agent_cli::install(clients, &directory, vendor, function, &options).await?
                }
                _ => return Err(err),
            },
        };
        report_install(function, &update);
        return Ok(());
    }

    let results = futures::stream::iter(args.functions.iter().cloned())
        .map(|function| {
            let directory = &directory;
            let options = &options;
            async move {
                let result =
                    lambda_agent_cli::install(clients, directory, vendor, &function, options).await;
                (function, result)
            }
        })
        .buffer_unordered(4)
        .collect::<Vec<_>>()
        .await;

    let mut failures = 0;
    for (function, result) in results {
        match result {
            Ok(update) => report_install(&function, &update),
            Err(err) => {
                failures += 1;
                eprintln!("{function}: {err:#}");
            }
        }
    }
    if failures > 0 {
        bail!("{failures} function(s) could not be instrumented");
    }
    Ok(())
}

fn report_install(function: &str, update: &lambda_agent_cli::function::UpdateRequest) {
    match &update.handler {
        Some(handler) => println!("{function}: agent installed (handler {handler})"),
        None => println!("{function}: agent installed"),
    }
}

async fn run_uninstall(clients: &AwsClients, vendor: Vendor, functions: Vec<String>) -> Result<()> {
    let results = futures::stream::iter(functions.into_iter())
        .map(|function| async move {
            let result = lambda_agent_cli::uninstall(clients, vendor, &function).await;
            (function, result)
        })
        .buffer_unordered(4)
        .collect::<Vec<_>>()
        .await;

    let mut failures = 0;
    for (function, result) in results {
        match result {
            Ok(update) => match &update.handler {
                Some(handler) => println!("{function}: agent removed (handler restored to {handler})"),
                None => println!("{function}: agent removed"),
            },
            Err(err) => {
                failures += 1;
                eprintln!("{function}: {err:#}");
            }
        }
    }
    if failures > 0 {
        bail!("{failures} function(s) could not be restored");
    }
    Ok(())
}

async fn run_list(clients: &AwsClients, vendor: Vendor) -> Result<()> {
    let summaries = lambda_agent_cli::list_functions(&clients.lambda, vendor).await?;
    if summaries.is_empty() {
        println!("no functions found");
        return Ok(());
    }
    for summary in summaries {
        let state = match summary.state {
            InstallState::Installed => "installed",
            InstallState::NotInstalled => "not installed",
            InstallState::UnsupportedRuntime => "unsupported runtime",
        };
        println!("{:<48} {:<12} {}", summary.name, summary.runtime, state);
    }
    Ok(())
}

async fn run_link_account(
    vendor: Vendor,
    api_key: Option<String>,
    aws_account_id: &str,
    role_arn: &str,
    name: &str,
) -> Result<()> {
    let api_key = api_key
        .or_else(|| env::var(vendor.api_key_env()).ok().filter(|key| !key.is_empty()))
        .ok_or(InstrumentError::MissingCredential("--api-key"))?;

    let dashboard = DashboardClient::new(vendor, api_key)?;
    dashboard.check_access().await?;
    let id = dashboard.link_account(aws_account_id, role_arn, name).await?;
    println!("account {aws_account_id} linked to the {vendor} dashboard (id {id})");
    Ok(())
}

/// Several published layers fit the runtime; ask which one to attach.
fn choose_layer(candidates: &[LayerCandidate]) -> Result<String> {
    let mut out = io::stderr();
    writeln!(out, "Several compatible layers were found:")?;
    for (index, candidate) in candidates.iter().enumerate() {
        match &candidate.description {
            Some(description) => writeln!(out, "  {}: {} ({description})", index + 1, candidate.arn)?,
            None => writeln!(out, "  {}: {}", index + 1, candidate.arn)?,
        }
    }
    write!(out, "Select a layer [1-{}]: ", candidates.len())?;
    out.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let choice: usize = line.trim().parse().context("selection is not a number")?;
    choice
        .checked_sub(1)
        .and_then(|index| candidates.get(index))
        .map(|candidate| candidate.arn.clone())
        .context("selection out of range")
}
