use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A tracked project as read from the local registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub url: String,
}

/// One point of the activity series returned by Compass.
///
/// Every metric is nullable; the remote service omits values it has not
/// computed yet. A value of the wrong JSON type reads as `None` instead of
/// failing the whole series. Fields the mapper does not use are kept so the
/// pass-through endpoint can return them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSeriesEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub level: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub active_c1_issue_comments_contributor_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub active_c1_issue_create_contributor_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub active_c1_pr_comments_contributor_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub active_c1_pr_create_contributor_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub active_c2_contributor_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub closed_issues_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub comment_frequency: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub commit_frequency: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub code_review_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub updated_issues_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub recent_releases_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub contributor_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub org_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub grimoire_creation_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub activity_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub created_since: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub updated_since: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub short_code: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub typ: Option<String>,
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(|v| v.as_f64()))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Storage-ready form of a [`MetricSeriesEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Assigned by storage on insert.
    pub id: Option<i64>,
    pub project_id: i64,
    pub label: Option<String>,
    pub closed_issues_count: Option<f64>,
    pub comment_frequency: Option<f64>,
    pub commit_frequency: Option<f64>,
    pub code_review_count: Option<f64>,
    pub updated_issues_count: Option<f64>,
    pub recent_releases_count: Option<f64>,
    pub contributor_count: Option<f64>,
    pub org_count: Option<f64>,
    pub grimoire_creation_date: Option<String>,
}

impl MetricRecord {
    /// Select the persisted subset of `entry` for `project_id`.
    pub fn from_entry(project_id: i64, entry: &MetricSeriesEntry) -> Self {
        Self {
            id: None,
            project_id,
            label: entry.label.clone(),
            closed_issues_count: entry.closed_issues_count,
            comment_frequency: entry.comment_frequency,
            commit_frequency: entry.commit_frequency,
            code_review_count: entry.code_review_count,
            updated_issues_count: entry.updated_issues_count,
            recent_releases_count: entry.recent_releases_count,
            contributor_count: entry.contributor_count,
            org_count: entry.org_count,
            grimoire_creation_date: entry.grimoire_creation_date.clone(),
        }
    }
}
