use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::InstrumentError;
use crate::vendor::Vendor;

/// One layer offered by the vendor directory for a runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerCandidate {
    pub arn: String,
    pub description: Option<String>,
}

/// How the vendor layer for an install was chosen.
#[derive(Debug, Clone)]
pub enum LayerSelection {
    /// Caller supplied an explicit layer version ARN.
    Explicit(String),
    /// Candidates fetched from the vendor layer directory, in directory
    /// order.
    Discovered(Vec<LayerCandidate>),
}

impl LayerSelection {
    /// Resolve to a single ARN. An explicit ARN always wins; a lone
    /// discovered candidate is auto-selected; zero or several candidates are
    /// surfaced to the caller, never guessed among.
    pub fn into_arn(self, runtime: &str) -> Result<String, InstrumentError> {
        match self {
            LayerSelection::Explicit(arn) => Ok(arn),
            LayerSelection::Discovered(mut candidates) => match candidates.len() {
                0 => Err(InstrumentError::NoCompatibleLayer(runtime.to_string())),
                1 => Ok(candidates.remove(0).arn),
                _ => Err(InstrumentError::AmbiguousLayer(candidates)),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryResponse {
    #[serde(rename = "Layers", default)]
    layers: Vec<DirectoryEntry>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    #[serde(rename = "LatestMatchingVersion")]
    latest_matching_version: LatestMatchingVersion,
    #[serde(rename = "Description")]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatestMatchingVersion {
    #[serde(rename = "LayerVersionArn")]
    layer_version_arn: String,
}

/// HTTP client for the vendor's per-region layer directory.
pub struct LayerDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl LayerDirectory {
    pub fn new(vendor: Vendor, region: &str) -> Result<Self, InstrumentError> {
        Self::with_base_url(vendor.layer_directory_url(region))
    }

    pub fn with_base_url(base_url: String) -> Result<Self, InstrumentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(LayerDirectory { http, base_url })
    }

    /// Layers published for the given runtime, in directory order.
    pub async fn layers_for(&self, runtime: &str) -> Result<Vec<LayerCandidate>, InstrumentError> {
        let url = format!("{}/get-layers", self.base_url);
        debug!(%url, runtime, "querying layer directory");
        let response = self
            .http
            .get(&url)
            .query(&[("CompatibleRuntime", runtime)])
            .send()
            .await?
            .error_for_status()?;
        let body: DirectoryResponse = response.json().await?;
        Ok(body
            .layers
            .into_iter()
            .map(|entry| LayerCandidate {
                arn: entry.latest_matching_version.layer_version_arn,
                description: entry.description,
            })
            .collect())
    }
}
