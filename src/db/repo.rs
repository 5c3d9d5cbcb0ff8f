use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::instrument;

use super::PersistenceError;
use crate::model::{MetricRecord, Project};

pub type Pool = SqlitePool;

/// Rows per INSERT statement; 11 bound columns keeps each statement under
/// SQLite's 999 parameter limit.
const INSERT_CHUNK_ROWS: usize = 80;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let mut options = SqlitePoolOptions::new();
    // Every connection to `sqlite::memory:` opens a fresh database.
    if normalized.starts_with("sqlite::memory") {
        options = options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }
    let pool = options
        .connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {normalized}"))?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs: expand a leading `~/`, create the parent
/// directory and ask SQLite to create the file. In-memory and non-SQLite URLs
/// pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{q}&mode=rwc"),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{expanded_path}?{query}")
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn count_projects(pool: &Pool) -> Result<u64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM github_projects")
        .fetch_one(pool)
        .await?;
    Ok(count.max(0) as u64)
}

#[instrument(skip(pool))]
pub async fn find_project_page(pool: &Pool, offset: u64, limit: u32) -> Result<Vec<Project>> {
    let rows = sqlx::query("SELECT id, html_url FROM github_projects ORDER BY id LIMIT ? OFFSET ?")
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).context("offset out of range")?)
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| Project {
            id: row.get("id"),
            url: row.get("html_url"),
        })
        .collect())
}

/// Register a project, returning its id. Existing URLs keep their id.
#[instrument(skip_all)]
pub async fn insert_project(pool: &Pool, html_url: &str) -> Result<i64> {
    if let Some(id) = sqlx::query_scalar::<_, i64>("SELECT id FROM github_projects WHERE html_url = ?")
        .bind(html_url)
        .fetch_optional(pool)
        .await?
    {
        return Ok(id);
    }

    let rec = sqlx::query("INSERT INTO github_projects (html_url) VALUES (?) RETURNING id")
        .bind(html_url)
        .fetch_one(pool)
        .await?;
    Ok(rec.get::<i64, _>("id"))
}

/// Insert `records` in one transaction. Rows that already exist for the same
/// project, label and collection date are skipped; any other failure rolls the
/// whole batch back.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn insert_metric_batch(
    pool: &Pool,
    records: &[MetricRecord],
) -> Result<u64, PersistenceError> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;
    for chunk in records.chunks(INSERT_CHUNK_ROWS) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO compass_activity (project_id, label, closed_issues_count, \
             comment_frequency, commit_frequency, code_review_count, updated_issues_count, \
             recent_releases_count, contributor_count, org_count, grimoire_creation_date) ",
        );
        qb.push_values(chunk, |mut b, r| {
            b.push_bind(r.project_id)
                .push_bind(r.label.clone())
                .push_bind(r.closed_issues_count)
                .push_bind(r.comment_frequency)
                .push_bind(r.commit_frequency)
                .push_bind(r.code_review_count)
                .push_bind(r.updated_issues_count)
                .push_bind(r.recent_releases_count)
                .push_bind(r.contributor_count)
                .push_bind(r.org_count)
                .push_bind(r.grimoire_creation_date.clone());
        });
        qb.push(" ON CONFLICT (project_id, label, grimoire_creation_date) DO NOTHING");
        let res = qb.build().execute(&mut *tx).await?;
        inserted += res.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

pub async fn count_metric_records(pool: &Pool) -> Result<i64> {
    let cnt: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM compass_activity")
        .fetch_one(pool)
        .await?;
    Ok(cnt)
}

/// Stored records of one project in insertion order.
pub async fn list_metric_records(pool: &Pool, project_id: i64) -> Result<Vec<MetricRecord>> {
    let rows = sqlx::query(
        "SELECT id, project_id, label, closed_issues_count, comment_frequency, commit_frequency, \
         code_review_count, updated_issues_count, recent_releases_count, contributor_count, \
         org_count, grimoire_creation_date FROM compass_activity WHERE project_id = ? ORDER BY id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(metric_from_row).collect())
}

fn metric_from_row(row: &SqliteRow) -> MetricRecord {
    MetricRecord {
        id: Some(row.get("id")),
        project_id: row.get("project_id"),
        label: row.get("label"),
        closed_issues_count: row.get("closed_issues_count"),
        comment_frequency: row.get("comment_frequency"),
        commit_frequency: row.get("commit_frequency"),
        code_review_count: row.get("code_review_count"),
        updated_issues_count: row.get("updated_issues_count"),
        recent_releases_count: row.get("recent_releases_count"),
        contributor_count: row.get("contributor_count"),
        org_count: row.get("org_count"),
        grimoire_creation_date: row.get("grimoire_creation_date"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn record(project_id: i64, date: &str, commits: f64) -> MetricRecord {
        MetricRecord {
            id: None,
            project_id,
            label: Some(format!("https://github.com/org/p{project_id}")),
            closed_issues_count: Some(1.0),
            comment_frequency: None,
            commit_frequency: Some(commits),
            code_review_count: Some(2.0),
            updated_issues_count: None,
            recent_releases_count: Some(0.0),
            contributor_count: Some(5.0),
            org_count: Some(1.0),
            grimoire_creation_date: Some(date.to_string()),
        }
    }

    #[test]
    fn prepare_sqlite_url_normalizes_file_urls() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("postgres://localhost/db"),
            "postgres://localhost/db"
        );

        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested/compass.db");
        let url = prepare_sqlite_url(&format!("sqlite://{}", path.display()));
        assert_eq!(url, format!("sqlite://{}?mode=rwc", path.display()));
        assert!(path.parent().unwrap().exists());

        let url = prepare_sqlite_url(&format!("sqlite://{}?mode=ro", path.display()));
        assert!(url.ends_with("?mode=ro"));
    }

    #[tokio::test]
    async fn pages_are_ordered_and_disjoint() {
        let pool = setup_pool().await;
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(
                insert_project(&pool, &format!("https://github.com/org/p{i}"))
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(count_projects(&pool).await.unwrap(), 5);

        let first = find_project_page(&pool, 0, 2).await.unwrap();
        let second = find_project_page(&pool, 2, 2).await.unwrap();
        let third = find_project_page(&pool, 4, 2).await.unwrap();
        let seen: Vec<i64> = first
            .iter()
            .chain(&second)
            .chain(&third)
            .map(|p| p.id)
            .collect();
        assert_eq!(seen, ids);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].url, "https://github.com/org/p4");
        assert!(find_project_page(&pool, 5, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_project_is_idempotent() {
        let pool = setup_pool().await;
        let a = insert_project(&pool, "https://github.com/a/a").await.unwrap();
        let b = insert_project(&pool, "https://github.com/a/a").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(count_projects(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn batch_insert_assigns_ids_and_keeps_order() {
        let pool = setup_pool().await;
        let pid = insert_project(&pool, "https://github.com/org/p").await.unwrap();
        let batch = vec![
            record(pid, "2024-01-01", 1.0),
            record(pid, "2024-02-01", 2.0),
            record(pid, "2024-03-01", 3.0),
        ];
        assert_eq!(insert_metric_batch(&pool, &batch).await.unwrap(), 3);

        let stored = list_metric_records(&pool, pid).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|r| r.id.is_some()));
        let dates: Vec<_> = stored
            .iter()
            .map(|r| r.grimoire_creation_date.clone().unwrap())
            .collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-02-01", "2024-03-01"]);
        assert_eq!(stored[2].commit_frequency, Some(3.0));
        assert_eq!(stored[0].comment_frequency, None);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let pool = setup_pool().await;
        assert_eq!(insert_metric_batch(&pool, &[]).await.unwrap(), 0);
        assert_eq!(count_metric_records(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_fails_as_a_whole() {
        let pool = setup_pool().await;
        let pid = insert_project(&pool, "https://github.com/org/p").await.unwrap();
        let batch = vec![
            record(pid, "2024-01-01", 1.0),
            record(pid + 1000, "2024-01-01", 1.0),
        ];
        let err = insert_metric_batch(&pool, &batch).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Database(_)));
        assert_eq!(count_metric_records(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reinserting_the_same_rows_does_not_duplicate() {
        let pool = setup_pool().await;
        let pid = insert_project(&pool, "https://github.com/org/p").await.unwrap();
        let batch = vec![record(pid, "2024-01-01", 1.0), record(pid, "2024-02-01", 2.0)];
        assert_eq!(insert_metric_batch(&pool, &batch).await.unwrap(), 2);
        assert_eq!(insert_metric_batch(&pool, &batch).await.unwrap(), 0);
        assert_eq!(count_metric_records(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn large_batches_span_several_statements() {
        let pool = setup_pool().await;
        let pid = insert_project(&pool, "https://github.com/org/p").await.unwrap();
        let batch: Vec<_> = (0..(INSERT_CHUNK_ROWS * 2 + 7))
            .map(|i| record(pid, &format!("day-{i:04}"), i as f64))
            .collect();
        let written = insert_metric_batch(&pool, &batch).await.unwrap();
        assert_eq!(written as usize, batch.len());
        assert_eq!(count_metric_records(&pool).await.unwrap() as usize, batch.len());
    }
}
