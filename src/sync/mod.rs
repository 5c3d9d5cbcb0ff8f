//! Paginated Compass activity sync.
//!
//! A job walks the project registry page by page. For every project in a page
//! it fetches the remote activity series, reverses it into chronological
//! order, maps each entry into a [`MetricRecord`] and collects the records in
//! a page-scoped [`PageBuffer`]. At the end of the page the buffer is flushed
//! through [`MetricSink::insert_batch`] exactly once, even when empty.
//!
//! Remote failures only cost the affected project and flush failures only
//! cost the affected page. Nothing is retried and no progress is checkpointed.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::compass::MetricsService;
use crate::db::{MetricSink, ProjectStore};
use crate::model::{MetricRecord, Project};

pub mod buffer;
pub mod page;

pub use buffer::{CapScope, PageBuffer};
pub use page::PageFetcher;

/// Record cap applied when none is configured.
pub const DEFAULT_RECORD_CAP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub page_size: u32,
    /// `None` disables truncation.
    pub record_cap: Option<usize>,
    pub cap_scope: CapScope,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            record_cap: Some(DEFAULT_RECORD_CAP),
            cap_scope: CapScope::Page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectOutcome {
    /// Series fetched; `records` of its entries made it into the page buffer.
    Synced { records: usize },
    /// The remote service has no data for this project.
    NoData,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectReport {
    pub project_id: i64,
    pub url: String,
    pub outcome: ProjectOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    Persisted { written: u64 },
    PersistFailed { error: String },
    ReadFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageReport {
    pub offset: u64,
    pub projects: Vec<ProjectReport>,
    pub records_buffered: usize,
    pub records_dropped: usize,
    pub outcome: PageOutcome,
}

impl PageReport {
    pub fn is_persisted(&self) -> bool {
        matches!(self.outcome, PageOutcome::Persisted { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub total_projects: u64,
    pub pages: Vec<PageReport>,
}

impl SyncReport {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn projects_processed(&self) -> usize {
        self.pages.iter().map(|p| p.projects.len()).sum()
    }

    /// Rows written by successful flushes.
    pub fn records_persisted(&self) -> u64 {
        self.pages
            .iter()
            .map(|p| match p.outcome {
                PageOutcome::Persisted { written } => written,
                _ => 0,
            })
            .sum()
    }

    pub fn failed_projects(&self) -> Vec<i64> {
        self.pages
            .iter()
            .flat_map(|p| &p.projects)
            .filter(|r| matches!(r.outcome, ProjectOutcome::Failed { .. }))
            .map(|r| r.project_id)
            .collect()
    }

    pub fn failed_pages(&self) -> Vec<u64> {
        self.pages
            .iter()
            .filter(|p| !p.is_persisted())
            .map(|p| p.offset)
            .collect()
    }
}

/// One full sync run over the project registry.
pub struct SyncJob<'a> {
    projects: &'a dyn ProjectStore,
    remote: &'a dyn MetricsService,
    sink: &'a dyn MetricSink,
    options: SyncOptions,
}

impl<'a> SyncJob<'a> {
    pub fn new(
        projects: &'a dyn ProjectStore,
        remote: &'a dyn MetricsService,
        sink: &'a dyn MetricSink,
        options: SyncOptions,
    ) -> Self {
        Self {
            projects,
            remote,
            sink,
            options,
        }
    }

    /// Process every page in offset order. Fails only when the project count
    /// cannot be read.
    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<SyncReport> {
        let mut pages = PageFetcher::start(self.projects, self.options.page_size).await?;
        let mut report = SyncReport {
            total_projects: pages.total(),
            pages: Vec::new(),
        };
        info!(
            total_projects = pages.total(),
            page_size = pages.page_size(),
            "compass sync started"
        );

        while let Some((offset, fetched)) = pages.next_page().await {
            let page = match fetched {
                Ok(projects) => self.sync_page(offset, &projects).await,
                Err(err) => {
                    error!(offset, ?err, "failed to read project page");
                    PageReport {
                        offset,
                        projects: Vec::new(),
                        records_buffered: 0,
                        records_dropped: 0,
                        outcome: PageOutcome::ReadFailed {
                            error: format!("{err:#}"),
                        },
                    }
                }
            };
            report.pages.push(page);
        }

        info!(
            pages = report.page_count(),
            projects = report.projects_processed(),
            records = report.records_persisted(),
            failed_projects = report.failed_projects().len(),
            failed_pages = report.failed_pages().len(),
            "compass sync complete"
        );
        Ok(report)
    }

    async fn sync_page(&self, offset: u64, projects: &[Project]) -> PageReport {
        let mut buffer = PageBuffer::new(self.options.record_cap, self.options.cap_scope);
        let mut reports = Vec::with_capacity(projects.len());

        for project in projects {
            let outcome = self.sync_project(project, &mut buffer).await;
            reports.push(ProjectReport {
                project_id: project.id,
                url: project.url.clone(),
                outcome,
            });
        }

        if buffer.is_empty() {
            debug!(offset, projects = projects.len(), "no records buffered for page");
        }
        let records_buffered = buffer.len();
        let records_dropped = buffer.dropped();
        let records = buffer.into_records();
        let outcome = match self.sink.insert_batch(&records).await {
            Ok(written) => {
                info!(
                    offset,
                    projects = projects.len(),
                    records = records_buffered,
                    written,
                    dropped = records_dropped,
                    "page flushed"
                );
                PageOutcome::Persisted { written }
            }
            Err(err) => {
                error!(offset, records = records_buffered, %err, "page flush failed");
                PageOutcome::PersistFailed {
                    error: err.to_string(),
                }
            }
        };

        PageReport {
            offset,
            projects: reports,
            records_buffered,
            records_dropped,
            outcome,
        }
    }

    async fn sync_project(&self, project: &Project, buffer: &mut PageBuffer) -> ProjectOutcome {
        match self.remote.fetch_series(&project.url).await {
            Err(err) => {
                warn!(project_id = project.id, url = %project.url, %err, "compass fetch failed");
                ProjectOutcome::Failed {
                    error: err.to_string(),
                }
            }
            Ok(series) if series.is_empty() => {
                info!(project_id = project.id, url = %project.url, "no compass activity data");
                ProjectOutcome::NoData
            }
            Ok(series) => {
                // Compass sends the newest entry first.
                let records = series
                    .iter()
                    .rev()
                    .map(|entry| MetricRecord::from_entry(project.id, entry));
                let kept = buffer.extend_project(records);
                ProjectOutcome::Synced { records: kept }
            }
        }
    }
}
