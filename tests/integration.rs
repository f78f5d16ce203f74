use aws_config::BehaviorVersion;
use aws_smithy_runtime::client::http::test_util::{ReplayEvent, StaticReplayClient};
use aws_smithy_types::body::SdkBody;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lambda_agent_cli::config::InstallOptions;
use lambda_agent_cli::error::InstrumentError;
use lambda_agent_cli::layers::LayerDirectory;
use lambda_agent_cli::patch::InstallState;
use lambda_agent_cli::vendor::Vendor;
use lambda_agent_cli::AwsClients;

const OTHER_LAYER: &str = "arn:aws:lambda:us-east-1:999999999999:layer:other:1";
const NR_LAYER: &str = "arn:aws:lambda:us-east-1:451483290750:layer:NewRelicPython39:5";

fn replay_event(uri: &str, response_body: Value) -> ReplayEvent {
    ReplayEvent::new(
        http::Request::builder()
            .uri(uri)
            .body(SdkBody::from(""))
            .unwrap(),
        http::Response::builder()
            .status(200)
            .body(SdkBody::from(response_body.to_string()))
            .unwrap(),
    )
}

/// Clients whose Lambda control plane is replayed from canned responses.
/// The other services are backed by an empty replay and must not be called.
fn test_clients(replay: &StaticReplayClient) -> AwsClients {
    let lambda_config = aws_sdk_lambda::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .credentials_provider(aws_sdk_lambda::config::Credentials::new(
            "AKIDEXAMPLE",
            "secret",
            None,
            None,
            "test",
        ))
        .region(aws_sdk_lambda::config::Region::new("us-east-1"))
        .http_client(replay.clone())
        .build();

    let idle = StaticReplayClient::new(Vec::new());
    let logs_config = aws_sdk_cloudwatchlogs::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .credentials_provider(aws_sdk_cloudwatchlogs::config::Credentials::new(
            "AKIDEXAMPLE",
            "secret",
            None,
            None,
            "test",
        ))
        .region(aws_sdk_cloudwatchlogs::config::Region::new("us-east-1"))
        .http_client(idle.clone())
        .build();
    let iam_config = aws_sdk_iam::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .credentials_provider(aws_sdk_iam::config::Credentials::new(
            "AKIDEXAMPLE",
            "secret",
            None,
            None,
            "test",
        ))
        .region(aws_sdk_iam::config::Region::new("us-east-1"))
        .http_client(idle.clone())
        .build();
    let secrets_config = aws_sdk_secretsmanager::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .credentials_provider(aws_sdk_secretsmanager::config::Credentials::new(
            "AKIDEXAMPLE",
            "secret",
            None,
            None,
            "test",
        ))
        .region(aws_sdk_secretsmanager::config::Region::new("us-east-1"))
        .http_client(idle)
        .build();

    AwsClients {
        lambda: aws_sdk_lambda::Client::from_conf(lambda_config),
        logs: aws_sdk_cloudwatchlogs::Client::from_conf(logs_config),
        iam: aws_sdk_iam::Client::from_conf(iam_config),
        secrets: aws_sdk_secretsmanager::Client::from_conf(secrets_config),
    }
}

fn plain_function_config() -> Value {
    json!({
        "FunctionName": "checkout",
        "FunctionArn": "arn:aws:lambda:us-east-1:123456789012:function:checkout",
        "Runtime": "python3.9",
        "Handler": "app.handler",
        "Role": "arn:aws:iam::123456789012:role/checkout-role",
        "Environment": { "Variables": { "FOO": "bar" } },
        "Layers": [ { "Arn": OTHER_LAYER, "CodeSize": 1024 } ]
    })
}

fn instrumented_function_config() -> Value {
    json!({
        "FunctionName": "checkout",
        "FunctionArn": "arn:aws:lambda:us-east-1:123456789012:function:checkout",
        "Runtime": "python3.9",
        "Handler": "newrelic_lambda_wrapper.handler",
        "Role": "arn:aws:iam::123456789012:role/checkout-role",
        "Environment": { "Variables": {
            "FOO": "bar",
            "NEW_RELIC_ACCOUNT_ID": "1234567",
            "NEW_RELIC_LAMBDA_EXTENSION_ENABLED": "false",
            "NEW_RELIC_LAMBDA_HANDLER": "app.handler"
        } },
        "Layers": [
            { "Arn": NR_LAYER, "CodeSize": 2048 },
            { "Arn": OTHER_LAYER, "CodeSize": 1024 }
        ]
    })
}

async fn layer_directory_with_one_candidate() -> (MockServer, LayerDirectory) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-layers"))
        .and(query_param("CompatibleRuntime", "python3.9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Layers": [{
                "LatestMatchingVersion": { "LayerVersionArn": NR_LAYER },
                "Description": "New Relic Python 3.9 agent"
            }]
        })))
        .mount(&server)
        .await;
    let directory = LayerDirectory::with_base_url(server.uri()).unwrap();
    (server, directory)
}

#[test_log::test(tokio::test)]
async fn install_rewrites_a_python_function() {
    let config_uri =
        "https://lambda.us-east-1.amazonaws.com/2015-03-31/functions/checkout/configuration";
    let replay = StaticReplayClient::new(vec![
        replay_event(config_uri, plain_function_config()),
        replay_event(config_uri, instrumented_function_config()),
    ]);
    let clients = test_clients(&replay);
    let (_server, directory) = layer_directory_with_one_candidate().await;

    let options = InstallOptions {
        account_id: Some("1234567".to_string()),
        ..Default::default()
    };
    let update = lambda_agent_cli::install(&clients, &directory, Vendor::NewRelic, "checkout", &options)
        .await
        .unwrap();

    assert_eq!(update.handler.as_deref(), Some("newrelic_lambda_wrapper.handler"));
    assert_eq!(update.layers, vec![NR_LAYER.to_string(), OTHER_LAYER.to_string()]);

    let requests: Vec<_> = replay.actual_requests().collect();
    assert_eq!(requests.len(), 2, "one read and one update");
    assert!(requests[1].uri().to_string().contains("/functions/checkout/configuration"));

    let body: Value =
        serde_json::from_slice(requests[1].body().bytes().expect("update request body")).unwrap();
    assert_eq!(body["Handler"], "newrelic_lambda_wrapper.handler");
    assert_eq!(body["Layers"], json!([NR_LAYER, OTHER_LAYER]));
    assert_eq!(
        body["Environment"]["Variables"],
        json!({
            "FOO": "bar",
            "NEW_RELIC_ACCOUNT_ID": "1234567",
            "NEW_RELIC_LAMBDA_EXTENSION_ENABLED": "false",
            "NEW_RELIC_LAMBDA_HANDLER": "app.handler"
        })
    );
}

#[test_log::test(tokio::test)]
async fn install_is_rejected_when_already_instrumented() {
    let config_uri =
        "https://lambda.us-east-1.amazonaws.com/2015-03-31/functions/checkout/configuration";
    let replay = StaticReplayClient::new(vec![replay_event(
        config_uri,
        instrumented_function_config(),
    )]);
    let clients = test_clients(&replay);
    // Never consulted: the install is rejected before layer discovery.
    let directory = LayerDirectory::with_base_url("http://127.0.0.1:9".to_string()).unwrap();

    let options = InstallOptions {
        account_id: Some("1234567".to_string()),
        ..Default::default()
    };
    let err = lambda_agent_cli::install(&clients, &directory, Vendor::NewRelic, "checkout", &options)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<InstrumentError>(),
        Some(InstrumentError::AlreadyInstalled(name)) if name == "checkout"
    ));
    assert_eq!(replay.actual_requests().count(), 1, "no update was attempted");
}

#[test_log::test(tokio::test)]
async fn uninstall_restores_the_original_configuration() {
    let config_uri =
        "https://lambda.us-east-1.amazonaws.com/2015-03-31/functions/checkout/configuration";
    let replay = StaticReplayClient::new(vec![
        replay_event(config_uri, instrumented_function_config()),
        replay_event(config_uri, plain_function_config()),
    ]);
    let clients = test_clients(&replay);

    let update = lambda_agent_cli::uninstall(&clients, Vendor::NewRelic, "checkout")
        .await
        .unwrap();

    assert_eq!(update.handler.as_deref(), Some("app.handler"));
    assert_eq!(update.layers, vec![OTHER_LAYER.to_string()]);

    let requests: Vec<_> = replay.actual_requests().collect();
    assert_eq!(requests.len(), 2);
    let body: Value =
        serde_json::from_slice(requests[1].body().bytes().expect("update request body")).unwrap();
    assert_eq!(body["Handler"], "app.handler");
    assert_eq!(body["Layers"], json!([OTHER_LAYER]));
    assert_eq!(body["Environment"]["Variables"], json!({ "FOO": "bar" }));
}

#[test_log::test(tokio::test)]
async fn list_classifies_every_function_in_the_region() {
    let list_uri = "https://lambda.us-east-1.amazonaws.com/2015-03-31/functions";
    let replay = StaticReplayClient::new(vec![replay_event(
        list_uri,
        json!({
            "Functions": [
                {
                    "FunctionName": "checkout",
                    "Runtime": "python3.9",
                    "Handler": "newrelic_lambda_wrapper.handler"
                },
                {
                    "FunctionName": "billing",
                    "Runtime": "python3.9",
                    "Handler": "app.handler"
                },
                {
                    "FunctionName": "edge",
                    "Runtime": "provided.al2",
                    "Handler": "bootstrap"
                }
            ]
        }),
    )]);
    let clients = test_clients(&replay);

    let summaries = lambda_agent_cli::list_functions(&clients.lambda, Vendor::NewRelic)
        .await
        .unwrap();

    let states: Vec<_> = summaries
        .iter()
        .map(|summary| (summary.name.as_str(), summary.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("checkout", InstallState::Installed),
            ("billing", InstallState::NotInstalled),
            ("edge", InstallState::UnsupportedRuntime),
        ]
    );
}
