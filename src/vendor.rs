use std::fmt;
use std::str::FromStr;

/// The monitoring vendor whose agent is being installed.
///
/// All vendor-specific constants hang off this enum so the patch engine and
/// the uninstall path share one source of truth for what "belongs to the
/// vendor" on a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    IoPipe,
    NewRelic,
}

impl Vendor {
    /// Reserved prefix of every environment variable the agent owns.
    /// Uninstall strips exactly the keys matching this prefix.
    pub fn env_prefix(self) -> &'static str {
        match self {
            Vendor::IoPipe => "IOPIPE_",
            Vendor::NewRelic => "NEW_RELIC_",
        }
    }

    /// Variable that preserves the pre-install handler so uninstall can
    /// restore it.
    pub fn original_handler_key(self) -> &'static str {
        match self {
            Vendor::IoPipe => "IOPIPE_HANDLER",
            Vendor::NewRelic => "NEW_RELIC_LAMBDA_HANDLER",
        }
    }

    /// Variable whose presence marks an install on runtimes where the
    /// handler is never rewritten.
    pub fn install_marker_key(self) -> &'static str {
        match self {
            Vendor::IoPipe => "IOPIPE_TOKEN",
            Vendor::NewRelic => "NEW_RELIC_ACCOUNT_ID",
        }
    }

    /// AWS account that publishes the vendor's layers.
    pub fn layer_account_id(self) -> &'static str {
        match self {
            Vendor::IoPipe => "146318645305",
            Vendor::NewRelic => "451483290750",
        }
    }

    /// Base URL of the per-region layer directory.
    pub fn layer_directory_url(self, region: &str) -> String {
        match self {
            Vendor::IoPipe => format!("https://{region}.layers.iopipe.com"),
            Vendor::NewRelic => format!("https://{region}.layers.newrelic-external.com"),
        }
    }

    pub fn graphql_endpoint(self) -> &'static str {
        match self {
            Vendor::IoPipe => "https://graphql.iopipe.com",
            Vendor::NewRelic => "https://api.newrelic.com/graphql",
        }
    }

    /// Environment variable consulted when `--api-key` is not passed.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Vendor::IoPipe => "IOPIPE_TOKEN",
            Vendor::NewRelic => "NEW_RELIC_API_KEY",
        }
    }

    pub fn subscription_filter_name(self) -> &'static str {
        match self {
            Vendor::IoPipe => "IopipeLogStreaming",
            Vendor::NewRelic => "NewRelicLogStreaming",
        }
    }

    pub fn log_filter_pattern(self) -> &'static str {
        match self {
            Vendor::IoPipe => "",
            Vendor::NewRelic => "?REPORT ?NR_LAMBDA_MONITORING ?\"Task timed out\" ?RequestId",
        }
    }

    /// Whether a layer version ARN was published by this vendor.
    ///
    /// Matches `arn:<partition>:lambda:<region>:<vendor account>:layer:...`
    /// for any region, so a function instrumented in one region is still
    /// recognized when inspected from another.
    pub fn owns_layer(self, arn: &str) -> bool {
        let parts: Vec<&str> = arn.split(':').collect();
        parts.len() >= 7
            && parts[0] == "arn"
            && parts[2] == "lambda"
            && parts[4] == self.layer_account_id()
            && parts[5] == "layer"
    }

    /// Whether an environment key is reserved by this vendor's agent.
    pub fn owns_env_key(self, key: &str) -> bool {
        key.starts_with(self.env_prefix())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "iopipe" => Ok(Vendor::IoPipe),
            "newrelic" => Ok(Vendor::NewRelic),
            other => Err(format!("unknown vendor {}", other)),
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Vendor::IoPipe => write!(f, "IOpipe"),
            Vendor::NewRelic => write!(f, "New Relic"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn recognizes_own_layers_in_any_region() {
        let vendor = Vendor::NewRelic;
        assert!(vendor.owns_layer("arn:aws:lambda:us-east-1:451483290750:layer:NewRelicPython39:5"));
        assert!(vendor.owns_layer("arn:aws:lambda:eu-west-2:451483290750:layer:NewRelicNodeJS18X:21"));
    }

    #[test]
    fn foreign_layers_are_not_claimed() {
        let vendor = Vendor::NewRelic;
        // another publisher
        assert!(!vendor.owns_layer("arn:aws:lambda:us-east-1:999999999999:layer:other:1"));
        // the other vendor
        assert!(!vendor.owns_layer("arn:aws:lambda:us-east-1:146318645305:layer:IOpipePython:3"));
        // not a layer ARN at all
        assert!(!vendor.owns_layer("arn:aws:lambda:us-east-1:451483290750:function:checkout"));
        assert!(!vendor.owns_layer("not-an-arn"));
    }

    #[test]
    fn env_keys_match_by_prefix_only() {
        assert!(Vendor::IoPipe.owns_env_key("IOPIPE_TOKEN"));
        assert!(Vendor::IoPipe.owns_env_key("IOPIPE_HANDLER"));
        assert!(!Vendor::IoPipe.owns_env_key("NEW_RELIC_ACCOUNT_ID"));
        assert!(!Vendor::IoPipe.owns_env_key("MY_IOPIPE_SETTING"));
        assert!(Vendor::NewRelic.owns_env_key("NEW_RELIC_LAMBDA_EXTENSION_ENABLED"));
        assert!(!Vendor::NewRelic.owns_env_key("FOO"));
    }

    #[test]
    fn parses_vendor_names() {
        assert_eq!("iopipe".parse::<Vendor>().unwrap(), Vendor::IoPipe);
        assert_eq!("newrelic".parse::<Vendor>().unwrap(), Vendor::NewRelic);
        assert!("datadog".parse::<Vendor>().is_err());
    }
}
