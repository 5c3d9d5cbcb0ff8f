use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::compass::model::{GraphQlRequest, GraphQlResponse};
use crate::model::MetricSeriesEntry;

pub mod model;

pub use model::QueryVariables;

pub const COMPASS_API_URL: &str = "https://oss-compass.org/api/graphql";

pub const METRIC_ACTIVITY_QUERY: &str = r#"query MetricActivity($label: String!, $level: String, $beginDate: ISO8601DateTime, $endDate: ISO8601DateTime) {
  metricActivity(label: $label, level: $level, beginDate: $beginDate, endDate: $endDate) {
    activeC1IssueCommentsContributorCount
    activeC1IssueCreateContributorCount
    activeC1PrCommentsContributorCount
    activeC1PrCreateContributorCount
    activeC2ContributorCount
    activityScore
    closedIssuesCount
    codeReviewCount
    commentFrequency
    commitFrequency
    contributorCount
    createdSince
    grimoireCreationDate
    label
    level
    orgCount
    recentReleasesCount
    shortCode
    type
    updatedIssuesCount
    updatedSince
  }
}"#;

/// Failure of a single remote fetch.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network, timeout or server-side unavailability.
    #[error("compass unavailable: {0}")]
    Unavailable(String),
    /// The response could not be understood.
    #[error("compass protocol error: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait MetricsService: Send + Sync {
    /// Fetch the activity series for one project, most recent entry first.
    async fn fetch_series(&self, project_url: &str) -> Result<Vec<MetricSeriesEntry>, RemoteError>;

    /// Run the activity query with explicit variables.
    async fn metric_activity(
        &self,
        variables: &QueryVariables,
    ) -> Result<Vec<MetricSeriesEntry>, RemoteError> {
        self.fetch_series(&variables.label).await
    }
}

#[derive(Clone)]
pub struct CompassClient {
    http: Client,
    endpoint: Url,
    level: Option<String>,
    begin_date: Option<chrono::NaiveDate>,
    end_date: Option<chrono::NaiveDate>,
}

impl fmt::Debug for CompassClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompassClient")
            .field("endpoint", &self.endpoint)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl CompassClient {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("compass-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            level: None,
            begin_date: None,
            end_date: None,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let endpoint = Url::parse(&cfg.compass.endpoint).context("invalid compass.endpoint")?;
        let mut client = Self::new(endpoint, Duration::from_secs(cfg.compass.timeout_secs))?;
        client.level = cfg.compass.level.clone();
        client.begin_date = cfg.compass.begin_date;
        client.end_date = cfg.compass.end_date;
        Ok(client)
    }

    /// Query variables used for a per-project sync fetch.
    pub fn variables_for(&self, project_url: &str) -> QueryVariables {
        QueryVariables {
            label: project_url.to_string(),
            level: self.level.clone(),
            begin_date: self.begin_date,
            end_date: self.end_date,
        }
    }

    pub fn build_request(&self, variables: &QueryVariables) -> Result<reqwest::Request> {
        let body = GraphQlRequest {
            query: METRIC_ACTIVITY_QUERY,
            variables,
        };
        self.http
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&body)
            .build()
            .context("failed to build Compass request")
    }

    /// Run the `MetricActivity` query with arbitrary variables. Entries are
    /// returned in the order the service sent them.
    pub async fn query(
        &self,
        variables: &QueryVariables,
    ) -> Result<Vec<MetricSeriesEntry>, RemoteError> {
        let request = self
            .build_request(variables)
            .map_err(|err| RemoteError::Protocol(format!("{err:#}")))?;
        debug!(url = %request.url(), label = %variables.label, "compass request");

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;

        let status = res.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "compass unavailable: {}", body);
            return Err(RemoteError::Unavailable(format!("status {status}: {body}")));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, "compass rejected request: {}", body);
            return Err(RemoteError::Protocol(format!("status {status}: {body}")));
        }

        let body = res
            .text()
            .await
            .map_err(|err| RemoteError::Unavailable(err.to_string()))?;
        parse_metric_activity(&body)
    }
}

/// Decode a GraphQL response body into the activity series.
pub fn parse_metric_activity(body: &str) -> Result<Vec<MetricSeriesEntry>, RemoteError> {
    let payload: GraphQlResponse = serde_json::from_str(body)
        .map_err(|err| RemoteError::Protocol(format!("invalid response JSON: {err}")))?;

    if let Some(errors) = payload.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        return Err(RemoteError::Protocol(messages.join("; ")));
    }

    payload
        .data
        .and_then(|data| data.metric_activity)
        .ok_or_else(|| RemoteError::Protocol("response has no metricActivity".to_string()))
}

#[async_trait]
impl MetricsService for CompassClient {
    async fn fetch_series(&self, project_url: &str) -> Result<Vec<MetricSeriesEntry>, RemoteError> {
        let variables = self.variables_for(project_url);
        self.query(&variables).await
    }

    async fn metric_activity(
        &self,
        variables: &QueryVariables,
    ) -> Result<Vec<MetricSeriesEntry>, RemoteError> {
        self.query(variables).await
    }
}
