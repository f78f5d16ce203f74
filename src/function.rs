use std::collections::HashMap;

use anyhow::Context;
use aws_sdk_lambda::operation::get_function_configuration::GetFunctionConfigurationOutput;

/// Immutable view of a deployed function at the moment it was read.
///
/// Fetched fresh before every patch computation; patches build a new desired
/// state from it and never modify it in place.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionConfig {
    pub function_arn: String,
    pub function_name: String,
    pub runtime: String,
    pub handler: String,
    pub environment: HashMap<String, String>,
    /// Layer version ARNs in application order.
    pub layers: Vec<String>,
    /// Execution role, consumed by the license-key policy feature.
    pub role: Option<String>,
}

impl FunctionConfig {
    pub fn from_sdk(config: GetFunctionConfigurationOutput) -> anyhow::Result<Self> {
        let function_arn = config
            .function_arn()
            .context("function configuration carries no ARN")?
            .to_string();
        let function_name = config
            .function_name()
            .context("function configuration carries no name")?
            .to_string();
        let runtime = config
            .runtime()
            .map(|runtime| runtime.as_str().to_string())
            .context("function has no runtime (container-image functions cannot be instrumented)")?;
        let handler = config
            .handler()
            .context("function has no configured handler")?
            .to_string();
        let environment = config
            .environment()
            .and_then(|environment| environment.variables())
            .cloned()
            .unwrap_or_default();
        let layers = config
            .layers()
            .iter()
            .filter_map(|layer| layer.arn().map(str::to_string))
            .collect();
        let role = config.role().map(str::to_string);

        Ok(FunctionConfig {
            function_arn,
            function_name,
            runtime,
            handler,
            environment,
            layers,
            role,
        })
    }

    /// Region parsed out of the function ARN.
    pub fn region(&self) -> Option<&str> {
        self.function_arn.split(':').nth(3)
    }
}

/// The desired mutation for a function, computed by the patch engine.
///
/// Environment and layers are full replacement values, not deltas; the
/// handler is absent for runtimes whose agent activates via environment
/// alone.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub function_name: String,
    pub handler: Option<String>,
    pub environment: HashMap<String, String>,
    pub layers: Vec<String>,
}
