use itertools::Itertools;
use thiserror::Error;

use crate::layers::LayerCandidate;

/// Failures produced while computing or resolving an agent install/uninstall.
///
/// Every variant carries enough detail for the CLI to render a precise
/// message; none of them is retried or swallowed internally.
#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("runtime {0:?} is not supported for agent instrumentation")]
    UnsupportedRuntime(String),

    #[error("{0} already has the agent installed (pass --upgrade to reapply it)")]
    AlreadyInstalled(String),

    #[error("{function} does not appear to be instrumented: {reason}")]
    NotInstalled { function: String, reason: String },

    #[error("runtime {0:?} ships multiple handler wrappers; pick one with --java-handler")]
    MissingVariantSelector(String),

    #[error("no compatible layer is published for runtime {0:?}")]
    NoCompatibleLayer(String),

    #[error(
        "several compatible layers were found; pass --layer-arn to pick one of:\n{}",
        candidate_lines(.0)
    )]
    AmbiguousLayer(Vec<LayerCandidate>),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("layer directory request failed: {0}")]
    LayerDirectory(#[from] reqwest::Error),
}

fn candidate_lines(candidates: &[LayerCandidate]) -> String {
    candidates
        .iter()
        .map(|candidate| match &candidate.description {
            Some(description) => format!("  {} ({})", candidate.arn, description),
            None => format!("  {}", candidate.arn),
        })
        .join("\n")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ambiguous_layer_message_lists_every_candidate() {
        let err = InstrumentError::AmbiguousLayer(vec![
            LayerCandidate {
                arn: "arn:aws:lambda:us-east-1:451483290750:layer:A:1".to_string(),
                description: Some("first".to_string()),
            },
            LayerCandidate {
                arn: "arn:aws:lambda:us-east-1:451483290750:layer:B:2".to_string(),
                description: None,
            },
        ]);
        let message = err.to_string();
        assert!(message.contains("layer:A:1 (first)"));
        assert!(message.contains("layer:B:2"));
    }
}
