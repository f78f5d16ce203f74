use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::InstrumentError;
use crate::vendor::Vendor;

/// Which wrapper flavor to use for runtimes that ship more than one
/// (currently only the Java request/stream pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerVariant {
    Request,
    Stream,
}

impl FromStr for HandlerVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "request" => Ok(HandlerVariant::Request),
            "stream" => Ok(HandlerVariant::Stream),
            other => Err(format!(
                "unknown handler variant {} (expected request or stream)",
                other
            )),
        }
    }
}

impl fmt::Display for HandlerVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HandlerVariant::Request => write!(f, "request"),
            HandlerVariant::Stream => write!(f, "stream"),
        }
    }
}

/// How the agent hooks into a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerSpec {
    /// The handler is rewritten to this wrapper path.
    Single(&'static str),
    /// The handler is rewritten to one of several wrappers; the caller must
    /// select which.
    Variants(&'static [(HandlerVariant, &'static str)]),
    /// The agent activates through environment variables alone and the
    /// handler is left untouched.
    EnvOnly,
}

impl HandlerSpec {
    /// The wrapper path the handler will be rewritten to, or `None` when the
    /// runtime needs no rewrite.
    pub fn wrapper(
        self,
        runtime: &str,
        variant: Option<HandlerVariant>,
    ) -> Result<Option<&'static str>, InstrumentError> {
        match self {
            HandlerSpec::Single(wrapper) => Ok(Some(wrapper)),
            HandlerSpec::Variants(wrappers) => {
                let selected =
                    variant.ok_or_else(|| InstrumentError::MissingVariantSelector(runtime.to_string()))?;
                wrappers
                    .iter()
                    .find(|(candidate, _)| *candidate == selected)
                    .map(|(_, wrapper)| Some(*wrapper))
                    .ok_or_else(|| InstrumentError::MissingVariantSelector(runtime.to_string()))
            }
            HandlerSpec::EnvOnly => Ok(None),
        }
    }

    /// Whether a configured handler is one of this runtime's wrappers.
    pub fn matches(self, handler: &str) -> bool {
        match self {
            HandlerSpec::Single(wrapper) => wrapper == handler,
            HandlerSpec::Variants(wrappers) => {
                wrappers.iter().any(|(_, wrapper)| *wrapper == handler)
            }
            HandlerSpec::EnvOnly => false,
        }
    }
}

static IOPIPE_JAVA: &[(HandlerVariant, &str)] = &[
    (
        HandlerVariant::Request,
        "com.iopipe.generic.GenericEntryPoint::handleRequest",
    ),
    (
        HandlerVariant::Stream,
        "com.iopipe.generic.GenericEntryPoint::handleStream",
    ),
];

static NEW_RELIC_JAVA: &[(HandlerVariant, &str)] = &[
    (
        HandlerVariant::Request,
        "com.newrelic.java.HandlerWrapper::handleRequest",
    ),
    (
        HandlerVariant::Stream,
        "com.newrelic.java.HandlerWrapper::handleStreams",
    ),
];

static IOPIPE_RUNTIMES: Lazy<HashMap<&'static str, HandlerSpec>> = Lazy::new(|| {
    HashMap::from([
        ("nodejs8.10", HandlerSpec::Single("@iopipe/iopipe/handler")),
        ("nodejs10.x", HandlerSpec::Single("@iopipe/iopipe/handler")),
        ("nodejs12.x", HandlerSpec::Single("@iopipe/iopipe/handler")),
        ("python2.7", HandlerSpec::Single("iopipe.handler.wrapper")),
        ("python3.6", HandlerSpec::Single("iopipe.handler.wrapper")),
        ("python3.7", HandlerSpec::Single("iopipe.handler.wrapper")),
        ("python3.8", HandlerSpec::Single("iopipe.handler.wrapper")),
        ("java8", HandlerSpec::Variants(IOPIPE_JAVA)),
    ])
});

static NEW_RELIC_RUNTIMES: Lazy<HashMap<&'static str, HandlerSpec>> = Lazy::new(|| {
    HashMap::from([
        ("nodejs16.x", HandlerSpec::Single("newrelic-lambda-wrapper.handler")),
        ("nodejs18.x", HandlerSpec::Single("newrelic-lambda-wrapper.handler")),
        ("nodejs20.x", HandlerSpec::Single("newrelic-lambda-wrapper.handler")),
        ("python3.8", HandlerSpec::Single("newrelic_lambda_wrapper.handler")),
        ("python3.9", HandlerSpec::Single("newrelic_lambda_wrapper.handler")),
        ("python3.10", HandlerSpec::Single("newrelic_lambda_wrapper.handler")),
        ("python3.11", HandlerSpec::Single("newrelic_lambda_wrapper.handler")),
        ("python3.12", HandlerSpec::Single("newrelic_lambda_wrapper.handler")),
        ("java8.al2", HandlerSpec::Variants(NEW_RELIC_JAVA)),
        ("java11", HandlerSpec::Variants(NEW_RELIC_JAVA)),
        ("java17", HandlerSpec::Variants(NEW_RELIC_JAVA)),
        ("dotnet6", HandlerSpec::EnvOnly),
        ("dotnet8", HandlerSpec::EnvOnly),
    ])
});

fn table(vendor: Vendor) -> &'static HashMap<&'static str, HandlerSpec> {
    match vendor {
        Vendor::IoPipe => &IOPIPE_RUNTIMES,
        Vendor::NewRelic => &NEW_RELIC_RUNTIMES,
    }
}

/// Look up how the vendor's agent hooks into a runtime.
///
/// Anything absent from the table is rejected, custom runtimes included;
/// there is no default pass-through.
pub fn lookup(vendor: Vendor, runtime: &str) -> Result<HandlerSpec, InstrumentError> {
    table(vendor)
        .get(runtime)
        .copied()
        .ok_or_else(|| InstrumentError::UnsupportedRuntime(runtime.to_string()))
}

/// Runtime identifiers the vendor supports, in no particular order.
pub fn supported(vendor: Vendor) -> impl Iterator<Item = &'static str> {
    table(vendor).keys().copied()
}
