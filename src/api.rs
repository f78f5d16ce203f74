use std::time::Duration;

use itertools::Itertools;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::vendor::Vendor;

const LINK_ACCOUNT_MUTATION: &str = "\
mutation($accountId: String!, $roleArn: String!, $name: String!) {
  linkAccount(accountId: $accountId, roleArn: $roleArn, name: $name) {
    id
    name
  }
}";

const LICENSE_KEY_QUERY: &str = "\
query($accountId: Int!) {
  actor {
    account(id: $accountId) {
      licenseKey
    }
  }
}";

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("dashboard request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("the API key was rejected by the {0} dashboard")]
    Unauthorized(Vendor),
    #[error("dashboard query failed: {0}")]
    Graph(String),
}

/// GraphQL client for the vendor dashboard: account linking, permission
/// probing, and the per-process license-key lookup.
pub struct DashboardClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    vendor: Vendor,
    /// Fetched at most once per process; never invalidated.
    license_key: OnceCell<String>,
}

impl DashboardClient {
    pub fn new(vendor: Vendor, api_key: String) -> Result<Self, DashboardError> {
        Self::with_endpoint(vendor, vendor.graphql_endpoint().to_string(), api_key)
    }

    pub fn with_endpoint(
        vendor: Vendor,
        endpoint: String,
        api_key: String,
    ) -> Result<Self, DashboardError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(DashboardClient {
            http,
            endpoint,
            api_key,
            vendor,
            license_key: OnceCell::new(),
        })
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, DashboardError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Api-Key", &self.api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DashboardError::Unauthorized(self.vendor));
        }
        let body: Value = response.error_for_status()?.json().await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|error| error.get("message").and_then(Value::as_str))
                    .join("; ");
                return Err(DashboardError::Graph(message));
            }
        }
        debug!("dashboard query succeeded");
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Cheap permission probe, run before any mutating call.
    pub async fn check_access(&self) -> Result<(), DashboardError> {
        self.graphql("query { actor { user { email } } }", json!({}))
            .await
            .map(|_| ())
    }

    /// Link an AWS account to the vendor dashboard; returns the id of the
    /// linked-account record.
    pub async fn link_account(
        &self,
        aws_account_id: &str,
        role_arn: &str,
        name: &str,
    ) -> Result<String, DashboardError> {
        let data = self
            .graphql(
                LINK_ACCOUNT_MUTATION,
                json!({ "accountId": aws_account_id, "roleArn": role_arn, "name": name }),
            )
            .await?;
        data.pointer("/linkAccount/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DashboardError::Graph("link response carried no account id".to_string()))
    }

    /// License key for the account, fetched once per process and reused.
    pub async fn license_key(&self, account_id: i64) -> Result<&str, DashboardError> {
        self.license_key
            .get_or_try_init(|| async {
                let data = self
                    .graphql(LICENSE_KEY_QUERY, json!({ "accountId": account_id }))
                    .await?;
                data.pointer("/actor/account/licenseKey")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        DashboardError::Graph("the account carries no license key".to_string())
                    })
            })
            .await
            .map(String::as_str)
    }
}
