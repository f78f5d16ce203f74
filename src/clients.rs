use aws_config::SdkConfig;
use aws_sdk_cloudwatchlogs::Client as LogsClient;
use aws_sdk_iam::Client as IamClient;
use aws_sdk_lambda::Client as LambdaClient;
use aws_sdk_secretsmanager::Client as SecretsClient;

/// A type used to hold the AWS clients required to interact with AWS
/// services used by the CLI commands.
#[derive(Clone)]
pub struct AwsClients {
    pub lambda: LambdaClient,
    pub logs: LogsClient,
    pub iam: IamClient,
    pub secrets: SecretsClient,
}

impl AwsClients {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        AwsClients {
            lambda: LambdaClient::new(sdk_config),
            logs: LogsClient::new(sdk_config),
            iam: IamClient::new(sdk_config),
            secrets: SecretsClient::new(sdk_config),
        }
    }
}
