use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::MetricSeriesEntry;

/// Variables of the `MetricActivity` query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryVariables {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Serialize, Debug)]
pub struct GraphQlRequest<'a> {
    pub query: &'static str,
    pub variables: &'a QueryVariables,
}

#[derive(Deserialize, Debug)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<MetricActivityData>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MetricActivityData {
    pub metric_activity: Option<Vec<MetricSeriesEntry>>,
}

#[derive(Deserialize, Debug)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: String,
}
