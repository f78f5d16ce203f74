use std::env;

use crate::error::InstrumentError;
use crate::runtimes::HandlerVariant;
use crate::vendor::Vendor;

pub const TOKEN_VAR: &str = "IOPIPE_TOKEN";
pub const ACCOUNT_ID_VAR: &str = "NEW_RELIC_ACCOUNT_ID";
pub const LICENSE_KEY_VAR: &str = "NEW_RELIC_LICENSE_KEY";

/// Caller-supplied knobs for a single install. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Explicit layer version ARN; skips the layer directory entirely.
    pub layer_arn: Option<String>,
    /// IOpipe project token.
    pub token: Option<String>,
    /// New Relic account id.
    pub account_id: Option<String>,
    pub license_key: Option<String>,
    /// Permit reapplying on a function that is already instrumented.
    pub upgrade: bool,
    pub java_variant: Option<HandlerVariant>,
    pub enable_extension: bool,
    /// Ship function logs through the extension.
    pub extension_send_logs: bool,
    /// Delimited key:value pairs forwarded to the agent.
    pub tags: Option<String>,
    pub env_delimiter: Option<String>,
}

impl InstallOptions {
    /// Fill unset credentials from the environment; explicit flags win.
    pub fn resolve_credentials(mut self) -> Self {
        if self.token.is_none() {
            self.token = non_empty_var(TOKEN_VAR);
        }
        if self.account_id.is_none() {
            self.account_id = non_empty_var(ACCOUNT_ID_VAR);
        }
        if self.license_key.is_none() {
            self.license_key = non_empty_var(LICENSE_KEY_VAR);
        }
        self
    }

    /// Reject missing credentials up front, before any network call.
    pub fn validate(&self, vendor: Vendor) -> Result<(), InstrumentError> {
        match vendor {
            Vendor::IoPipe if self.token.is_none() => {
                Err(InstrumentError::MissingCredential("--token (or IOPIPE_TOKEN)"))
            }
            Vendor::NewRelic if self.account_id.is_none() => Err(InstrumentError::MissingCredential(
                "--account-id (or NEW_RELIC_ACCOUNT_ID)",
            )),
            Vendor::NewRelic if self.enable_extension && self.license_key.is_none() => {
                Err(InstrumentError::MissingCredential(
                    "--license-key (or NEW_RELIC_LICENSE_KEY), required with --enable-extension",
                ))
            }
            _ => Ok(()),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}
