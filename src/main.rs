use std::env;
use std::time::Duration;

use clap::Parser;
use miette::Diagnostic;
use miette::Result;
use thiserror::Error;
use url::Url;

use crate::cli::Cli;
use crate::client::ApiClient;
use crate::retry::RetryError;
use crate::retry::RetryPolicy;
use crate::scenario::Scenario;
use crate::scenario::ScenarioError;

mod cli;
mod client;
mod outputter;
mod retry;
mod scenario;

const BASE_URL_ENV: &str = "QA_URL";
const DEFAULT_BASE_URL: &str = "http://localhost:8082";

#[derive(Error, Debug, Diagnostic)]
pub enum ProbeError {
    #[error("invalid service url")]
    InvalidUrl(#[from] url::ParseError),

    #[error("service never became ready")]
    NotReady(#[source] RetryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ScenarioError(#[from] ScenarioError),

    #[error("{failed} of {total} steps failed")]
    StepsFailed { failed: usize, total: usize },
}

/// Resolves the base URL of the service under test: the `--service-url`
/// flag wins, then the `QA_URL` environment variable, then the local
/// default.
fn resolve_base_url(cli: &Cli) -> Result<Url, ProbeError> {
    let raw = cli
        .service_url
        .clone()
        .or_else(|| env::var(BASE_URL_ENV).ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    Ok(Url::parse(&raw)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_url = resolve_base_url(&cli)?;
    let policy = RetryPolicy::new(cli.max_attempts, Duration::from_secs(cli.retry_delay));
    let client = ApiClient::new(base_url);

    // Verify the service is up before any lifecycle step runs. If this
    // gate never opens the whole run fails fast.
    outputter::setup(&format!(
        "waiting for {} to be ready..! ⚙️",
        client.base_url()
    ));
    retry::await_ready(&client, &policy)
        .await
        .map_err(ProbeError::NotReady)?;

    outputter::setup("service is ready, running the student lifecycle..! ⚙️");

    let summary = Scenario::new(&client, policy)
        .run()
        .await
        .map_err(ProbeError::ScenarioError)?;

    outputter::run_summary(&summary);

    if !summary.all_passed() {
        return Err(ProbeError::StepsFailed {
            failed: summary.failures().count(),
            total: summary.reports.len(),
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use crate::cli::Cli;
    use crate::resolve_base_url;

    #[test]
    fn explicit_service_url_wins() {
        let cli = Cli {
            service_url: Some("http://qa.internal:9090".to_string()),
            max_attempts: 5,
            retry_delay: 10,
        };

        let url = resolve_base_url(&cli).unwrap();
        assert_eq!(url.as_str(), "http://qa.internal:9090/");
    }

    #[test]
    fn malformed_service_url_is_rejected() {
        let cli = Cli {
            service_url: Some("not a url".to_string()),
            max_attempts: 5,
            retry_delay: 10,
        };

        assert!(resolve_base_url(&cli).is_err());
    }
}
