use std::collections::HashMap;

use tracing::debug;

use crate::config::InstallOptions;
use crate::error::InstrumentError;
use crate::function::{FunctionConfig, UpdateRequest};
use crate::layers::LayerSelection;
use crate::runtimes::{self, HandlerSpec};
use crate::vendor::Vendor;

/// The handler rewrite an install will perform, decided before any layer
/// lookup so callers can fail fast without a directory round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallTarget {
    /// Wrapper the handler will be rewritten to; `None` when the runtime's
    /// agent activates through environment variables alone.
    pub wrapper: Option<&'static str>,
    /// True when the snapshot still carries the customer's own entry point,
    /// i.e. this is the first install rather than an upgrade.
    pub fresh: bool,
}

/// Install state of a function, as reported by `list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Installed,
    NotInstalled,
    UnsupportedRuntime,
}

/// The one predicate both install and uninstall use to decide "installed by
/// us": wrapper membership for rewritten runtimes, marker-variable presence
/// for env-only ones.
fn is_installed(
    vendor: Vendor,
    spec: HandlerSpec,
    handler: &str,
    environment: &HashMap<String, String>,
) -> bool {
    match spec {
        HandlerSpec::EnvOnly => environment.contains_key(vendor.install_marker_key()),
        _ => spec.matches(handler),
    }
}

/// Classify a function without computing a mutation.
pub fn install_state(
    vendor: Vendor,
    runtime: &str,
    handler: &str,
    environment: &HashMap<String, String>,
) -> InstallState {
    match runtimes::lookup(vendor, runtime) {
        Err(_) => InstallState::UnsupportedRuntime,
        Ok(spec) => {
            if is_installed(vendor, spec, handler, environment) {
                InstallState::Installed
            } else {
                InstallState::NotInstalled
            }
        }
    }
}

/// Decide the handler rewrite and check install state, without touching the
/// layer directory.
pub fn plan_install(
    vendor: Vendor,
    function: &FunctionConfig,
    options: &InstallOptions,
) -> Result<InstallTarget, InstrumentError> {
    let spec = runtimes::lookup(vendor, &function.runtime)?;
    let wrapper = spec.wrapper(&function.runtime, options.java_variant)?;

    let installed = is_installed(vendor, spec, &function.handler, &function.environment);
    if installed && !options.upgrade {
        return Err(InstrumentError::AlreadyInstalled(function.function_name.clone()));
    }

    Ok(InstallTarget {
        wrapper,
        fresh: !installed,
    })
}

/// Compute the full mutation that installs the vendor agent.
///
/// Pure: reads only its arguments, performs no I/O, and is deterministic, so
/// recomputing from a re-fetched snapshot is always safe.
pub fn compute_install(
    vendor: Vendor,
    function: &FunctionConfig,
    options: &InstallOptions,
    layers: LayerSelection,
) -> Result<UpdateRequest, InstrumentError> {
    let target = plan_install(vendor, function, options)?;

    let (replaced, preserved): (Vec<String>, Vec<String>) = function
        .layers
        .iter()
        .cloned()
        .partition(|arn| vendor.owns_layer(arn));
    debug!(
        replaced = replaced.len(),
        preserved = preserved.len(),
        "partitioned existing layers"
    );

    let layer_arn = layers.into_arn(&function.runtime)?;

    let mut environment = function.environment.clone();
    for (key, value) in agent_environment(vendor, options) {
        environment.insert(key.to_string(), value);
    }
    if target.wrapper.is_some() && target.fresh {
        // Recorded once, on first install only. On an upgrade the existing
        // record still names the customer's handler; the visible handler is
        // the wrapper and must never leak into it.
        environment.insert(
            vendor.original_handler_key().to_string(),
            function.handler.clone(),
        );
    }

    let mut all_layers = Vec::with_capacity(preserved.len() + 1);
    all_layers.push(layer_arn);
    all_layers.extend(preserved);

    Ok(UpdateRequest {
        function_name: function.function_name.clone(),
        handler: target.wrapper.map(str::to_string),
        environment,
        layers: all_layers,
    })
}

/// Compute the full mutation that removes the vendor agent and restores the
/// customer's original configuration.
pub fn compute_uninstall(
    vendor: Vendor,
    function: &FunctionConfig,
) -> Result<UpdateRequest, InstrumentError> {
    let spec = runtimes::lookup(vendor, &function.runtime)?;

    let original_handler = match spec {
        HandlerSpec::EnvOnly => {
            if !function.environment.contains_key(vendor.install_marker_key()) {
                return Err(InstrumentError::NotInstalled {
                    function: function.function_name.clone(),
                    reason: format!("{} is not set", vendor.install_marker_key()),
                });
            }
            None
        }
        _ => {
            if !spec.matches(&function.handler) {
                return Err(InstrumentError::NotInstalled {
                    function: function.function_name.clone(),
                    reason: format!("handler {:?} is not an agent wrapper", function.handler),
                });
            }
            let original = function
                .environment
                .get(vendor.original_handler_key())
                .ok_or_else(|| InstrumentError::NotInstalled {
                    function: function.function_name.clone(),
                    reason: format!(
                        "{} is missing, the original handler cannot be restored",
                        vendor.original_handler_key()
                    ),
                })?;
            Some(original.clone())
        }
    };

    let environment: HashMap<String, String> = function
        .environment
        .iter()
        .filter(|(key, _)| !vendor.owns_env_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let layers: Vec<String> = function
        .layers
        .iter()
        .filter(|arn| !vendor.owns_layer(arn))
        .cloned()
        .collect();

    Ok(UpdateRequest {
        function_name: function.function_name.clone(),
        handler: original_handler,
        environment,
        layers,
    })
}

fn agent_environment(vendor: Vendor, options: &InstallOptions) -> Vec<(&'static str, String)> {
    let mut vars = Vec::new();
    match vendor {
        Vendor::IoPipe => {
            if let Some(token) = &options.token {
                vars.push(("IOPIPE_TOKEN", token.clone()));
            }
        }
        Vendor::NewRelic => {
            if let Some(account_id) = &options.account_id {
                vars.push(("NEW_RELIC_ACCOUNT_ID", account_id.clone()));
            }
            if let Some(license_key) = &options.license_key {
                vars.push(("NEW_RELIC_LICENSE_KEY", license_key.clone()));
            }
            vars.push((
                "NEW_RELIC_LAMBDA_EXTENSION_ENABLED",
                options.enable_extension.to_string(),
            ));
            if options.extension_send_logs {
                vars.push(("NEW_RELIC_EXTENSION_SEND_FUNCTION_LOGS", "true".to_string()));
            }
            if let Some(tags) = &options.tags {
                vars.push(("NEW_RELIC_TAGS", tags.clone()));
            }
            if let Some(delimiter) = &options.env_delimiter {
                vars.push(("NEW_RELIC_ENV_DELIMITER", delimiter.clone()));
            }
        }
    }
    vars
}
