use anyhow::{Context, Result};
use aws_sdk_lambda::types::Environment;
use aws_sdk_lambda::Client as LambdaClient;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::InstallOptions;
use crate::function::{FunctionConfig, UpdateRequest};
use crate::layers::{LayerDirectory, LayerSelection};
use crate::vendor::Vendor;

pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod function;
pub mod layers;
pub mod patch;
pub mod runtimes;
pub mod secrets;
pub mod subscriptions;
pub mod vendor;

pub use clients::AwsClients;

pub fn set_up_logging(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default.into())
                .from_env_lossy(),
        )
        .init();
}

/// Read the function's current configuration. Always re-fetched immediately
/// before a patch computation; never cached across attempts.
pub async fn fetch_function(lambda: &LambdaClient, name: &str) -> Result<FunctionConfig> {
    let config = lambda
        .get_function_configuration()
        .function_name(name)
        .send()
        .await
        .with_context(|| format!("failed to read the configuration of {name}"))?;
    FunctionConfig::from_sdk(config)
}

pub async fn apply_update(lambda: &LambdaClient, update: &UpdateRequest) -> Result<()> {
    let environment = Environment::builder()
        .set_variables(Some(update.environment.clone()))
        .build();
    lambda
        .update_function_configuration()
        .function_name(&update.function_name)
        .set_handler(update.handler.clone())
        .environment(environment)
        .set_layers(Some(update.layers.clone()))
        .send()
        .await
        .with_context(|| format!("failed to update {}", update.function_name))?;
    Ok(())
}

/// Install the vendor agent on one function: snapshot, compute, apply.
pub async fn install(
    clients: &AwsClients,
    directory: &LayerDirectory,
    vendor: Vendor,
    function_name: &str,
    options: &InstallOptions,
) -> Result<UpdateRequest> {
    options.validate(vendor)?;

    let function = fetch_function(&clients.lambda, function_name).await?;
    // Fails fast on unsupported/already-installed functions, before the
    // layer directory round trip.
    let target = patch::plan_install(vendor, &function, options)?;
    debug!(?target, function = function_name, "planned install");

    let selection = match &options.layer_arn {
        Some(arn) => LayerSelection::Explicit(arn.clone()),
        None => LayerSelection::Discovered(directory.layers_for(&function.runtime).await?),
    };
    let update = patch::compute_install(vendor, &function, options, selection)?;
    apply_update(&clients.lambda, &update).await?;
    info!(function = function_name, "agent installed");

    if vendor == Vendor::NewRelic && options.enable_extension {
        if let (Some(license_key), Some(role)) = (&options.license_key, &function.role) {
            let secret_arn = secrets::ensure_license_key_secret(&clients.secrets, license_key).await?;
            secrets::grant_license_key_read(&clients.iam, role, &secret_arn).await?;
        }
    }

    Ok(update)
}

/// Remove the vendor agent from one function and restore its original
/// handler, environment, and layers.
pub async fn uninstall(
    clients: &AwsClients,
    vendor: Vendor,
    function_name: &str,
) -> Result<UpdateRequest> {
    let function = fetch_function(&clients.lambda, function_name).await?;
    let update = patch::compute_uninstall(vendor, &function)?;
    apply_update(&clients.lambda, &update).await?;
    info!(function = function_name, "agent removed");
    Ok(update)
}

/// One row of `list` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSummary {
    pub name: String,
    pub runtime: String,
    pub state: patch::InstallState,
}

/// Every function in the region, classified by install state.
pub async fn list_functions(lambda: &LambdaClient, vendor: Vendor) -> Result<Vec<FunctionSummary>> {
    let mut summaries = Vec::new();
    let mut pages = lambda.list_functions().into_paginator().items().send();
    while let Some(function) = pages.next().await {
        let function = function.context("failed to list functions")?;
        let (Some(name), Some(runtime), Some(handler)) =
            (function.function_name(), function.runtime(), function.handler())
        else {
            continue;
        };
        let environment = function
            .environment()
            .and_then(|environment| environment.variables())
            .cloned()
            .unwrap_or_default();
        summaries.push(FunctionSummary {
            name: name.to_string(),
            runtime: runtime.as_str().to_string(),
            state: patch::install_state(vendor, runtime.as_str(), handler, &environment),
        });
    }
    Ok(summaries)
}
