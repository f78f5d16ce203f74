use anyhow::{Context, Result};
use aws_sdk_cloudwatchlogs::Client as LogsClient;
use tracing::info;

use crate::vendor::Vendor;

fn log_group_for(function_name: &str) -> String {
    format!("/aws/lambda/{function_name}")
}

/// Point the function's log group at the vendor's log-ingestion function.
/// A filter that already matches is left alone.
pub async fn ensure_subscription(
    logs: &LogsClient,
    vendor: Vendor,
    function_name: &str,
    destination_arn: &str,
) -> Result<()> {
    let log_group = log_group_for(function_name);
    let existing = logs
        .describe_subscription_filters()
        .log_group_name(&log_group)
        .send()
        .await
        .with_context(|| format!("failed to list subscription filters on {log_group}"))?;

    if existing.subscription_filters().iter().any(|filter| {
        filter.filter_name() == Some(vendor.subscription_filter_name())
            && filter.destination_arn() == Some(destination_arn)
    }) {
        info!(%log_group, "subscription filter already in place");
        return Ok(());
    }

    logs.put_subscription_filter()
        .log_group_name(&log_group)
        .filter_name(vendor.subscription_filter_name())
        .filter_pattern(vendor.log_filter_pattern())
        .destination_arn(destination_arn)
        .send()
        .await
        .with_context(|| format!("failed to subscribe {log_group} to {destination_arn}"))?;
    info!(%log_group, destination_arn, "subscription filter created");
    Ok(())
}

/// Remove the vendor's subscription filter. A missing filter (or a missing
/// log group, for a function that never logged) is not an error.
pub async fn remove_subscription(
    logs: &LogsClient,
    vendor: Vendor,
    function_name: &str,
) -> Result<()> {
    let log_group = log_group_for(function_name);
    let result = logs
        .delete_subscription_filter()
        .log_group_name(&log_group)
        .filter_name(vendor.subscription_filter_name())
        .send()
        .await;

    match result {
        Ok(_) => {
            info!(%log_group, "subscription filter removed");
            Ok(())
        }
        Err(err) => {
            let service_err = err.into_service_error();
            if service_err.is_resource_not_found_exception() {
                info!(%log_group, "no subscription filter to remove");
                return Ok(());
            }
            Err(service_err)
                .with_context(|| format!("failed to remove the subscription filter on {log_group}"))
        }
    }
}
