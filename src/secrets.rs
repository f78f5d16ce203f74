use anyhow::{Context, Result};
use aws_sdk_iam::Client as IamClient;
use aws_sdk_secretsmanager::Client as SecretsClient;
use serde_json::json;
use tracing::info;

pub const LICENSE_KEY_SECRET_NAME: &str = "NEW_RELIC_LICENSE_KEY";
const LICENSE_KEY_POLICY_NAME: &str = "NewRelicLicenseKeyReadAccess";

/// Create the shared license-key secret if it does not exist yet. Returns
/// the secret's ARN either way.
pub async fn ensure_license_key_secret(
    secrets: &SecretsClient,
    license_key: &str,
) -> Result<String> {
    let created = secrets
        .create_secret()
        .name(LICENSE_KEY_SECRET_NAME)
        .description("The New Relic license key, used by the telemetry extension")
        .secret_string(json!({ "LicenseKey": license_key }).to_string())
        .send()
        .await;

    match created {
        Ok(output) => {
            info!(secret = LICENSE_KEY_SECRET_NAME, "license-key secret created");
            output
                .arn()
                .context("secret was created without an ARN")
                .map(str::to_string)
        }
        Err(err) => {
            let service_err = err.into_service_error();
            if !service_err.is_resource_exists_exception() {
                return Err(service_err).context("failed to create the license-key secret");
            }
            let existing = secrets
                .describe_secret()
                .secret_id(LICENSE_KEY_SECRET_NAME)
                .send()
                .await
                .context("failed to look up the existing license-key secret")?;
            existing
                .arn()
                .context("existing secret carries no ARN")
                .map(str::to_string)
        }
    }
}

/// Attach an inline policy to the function's execution role granting read
/// access to the license-key secret.
pub async fn grant_license_key_read(
    iam: &IamClient,
    role_arn: &str,
    secret_arn: &str,
) -> Result<()> {
    let role_name = role_name_from_arn(role_arn)
        .with_context(|| format!("cannot derive a role name from {role_arn}"))?;
    let policy = json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": "secretsmanager:GetSecretValue",
            "Resource": secret_arn,
        }]
    });

    iam.put_role_policy()
        .role_name(role_name)
        .policy_name(LICENSE_KEY_POLICY_NAME)
        .policy_document(policy.to_string())
        .send()
        .await
        .with_context(|| format!("failed to attach {LICENSE_KEY_POLICY_NAME} to {role_name}"))?;
    info!(role = role_name, "license-key read access granted");
    Ok(())
}

fn role_name_from_arn(role_arn: &str) -> Option<&str> {
    role_arn.rsplit_once('/').map(|(_, name)| name)
}
