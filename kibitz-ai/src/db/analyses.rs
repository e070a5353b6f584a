//! Analysis job database operations
//!
//! Every write is a full document write: all columns are bound from the
//! in-memory [`Analysis`], never patched field by field.

use chrono::{DateTime, SecondsFormat, Utc};
use kibitz_common::{Error, Owner, Result};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{query::Query, QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::settings::get_max_lock_wait_ms;
use crate::models::{Analysis, AnalysisResult, AnalysisStatus};
use crate::utils::retry_on_lock;

const SELECT_COLUMNS: &str = r#"
    SELECT analysis_id, batch_id, owner_kind, owner_id, pgn, file_ref,
           player_name, player_side, white, black, outcome, event, date, eco,
           opening, status, result, error, created_at, updated_at, completed_at
    FROM analyses
"#;

const INSERT_SQL: &str = r#"
    INSERT INTO analyses (
        batch_id, owner_kind, owner_id, pgn, file_ref, player_name, player_side,
        white, black, outcome, event, date, eco, opening,
        status, result, error, created_at, updated_at, completed_at,
        analysis_id
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_SQL: &str = r#"
    UPDATE analyses SET
        batch_id = ?, owner_kind = ?, owner_id = ?, pgn = ?, file_ref = ?,
        player_name = ?, player_side = ?, white = ?, black = ?, outcome = ?,
        event = ?, date = ?, eco = ?, opening = ?,
        status = ?, result = ?, error = ?,
        created_at = ?, updated_at = ?, completed_at = ?
    WHERE analysis_id = ?
"#;

/// Column values prepared before touching the database
struct AnalysisColumns {
    analysis_id: String,
    batch_id: Option<String>,
    owner_kind: &'static str,
    owner_id: Option<String>,
    pgn: String,
    file_ref: String,
    player_name: String,
    player_side: &'static str,
    white: String,
    black: String,
    outcome: String,
    event: Option<String>,
    date: Option<String>,
    eco: Option<String>,
    opening: Option<String>,
    status: &'static str,
    result: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl AnalysisColumns {
    fn from_analysis(analysis: &Analysis) -> Result<Self> {
        let (owner_kind, owner_id) = analysis.owner.to_columns();
        let result = analysis
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to serialize result: {}", e)))?;

        Ok(Self {
            analysis_id: analysis.analysis_id.to_string(),
            batch_id: analysis.batch_id.map(|id| id.to_string()),
            owner_kind,
            owner_id: owner_id.map(str::to_string),
            pgn: analysis.pgn.clone(),
            file_ref: analysis.file_ref.clone(),
            player_name: analysis.player_name.clone(),
            player_side: analysis.player_side.as_str(),
            white: analysis.white.clone(),
            black: analysis.black.clone(),
            outcome: analysis.outcome.clone(),
            event: analysis.event.clone(),
            date: analysis.date.clone(),
            eco: analysis.eco.clone(),
            opening: analysis.opening.clone(),
            status: analysis.status.as_str(),
            result,
            error: analysis.error.clone(),
            created_at: format_timestamp(&analysis.created_at),
            updated_at: format_timestamp(&analysis.updated_at),
            completed_at: analysis.completed_at.as_ref().map(format_timestamp),
        })
    }

    /// Bind in the order shared by INSERT_SQL and UPDATE_SQL
    fn bind<'q>(
        &'q self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        query
            .bind(self.batch_id.as_deref())
            .bind(self.owner_kind)
            .bind(self.owner_id.as_deref())
            .bind(self.pgn.as_str())
            .bind(self.file_ref.as_str())
            .bind(self.player_name.as_str())
            .bind(self.player_side)
            .bind(self.white.as_str())
            .bind(self.black.as_str())
            .bind(self.outcome.as_str())
            .bind(self.event.as_deref())
            .bind(self.date.as_deref())
            .bind(self.eco.as_deref())
            .bind(self.opening.as_deref())
            .bind(self.status)
            .bind(self.result.as_deref())
            .bind(self.error.as_deref())
            .bind(self.created_at.as_str())
            .bind(self.updated_at.as_str())
            .bind(self.completed_at.as_deref())
            .bind(self.analysis_id.as_str())
    }
}

/// Insert a new analysis job
///
/// Returns the storage-internal row id, which is never exposed to clients.
pub async fn create_analysis(pool: &SqlitePool, analysis: &Analysis) -> Result<i64> {
    let columns = &AnalysisColumns::from_analysis(analysis)?;
    let max_wait_ms = get_max_lock_wait_ms(pool).await?;

    retry_on_lock("create_analysis", max_wait_ms, move || async move {
        let result = columns
            .bind(sqlx::query(INSERT_SQL))
            .execute(pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.last_insert_rowid())
    })
    .await
}

/// Overwrite the stored document for this analysis
pub async fn save_analysis(pool: &SqlitePool, analysis: &Analysis) -> Result<()> {
    let columns = &AnalysisColumns::from_analysis(analysis)?;
    let max_wait_ms = get_max_lock_wait_ms(pool).await?;

    let rows = retry_on_lock("save_analysis", max_wait_ms, move || async move {
        let result = columns
            .bind(sqlx::query(UPDATE_SQL))
            .execute(pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    })
    .await?;

    if rows == 0 {
        return Err(Error::NotFound(format!(
            "Analysis not found: {}",
            analysis.analysis_id
        )));
    }

    Ok(())
}

/// Overwrite the stored document only if its status still equals `expected`
///
/// The status check and the write happen in one statement, so of two
/// workers racing on the same job exactly one sees `true`.
pub async fn save_analysis_if_status(
    pool: &SqlitePool,
    analysis: &Analysis,
    expected: AnalysisStatus,
) -> Result<bool> {
    let columns = &AnalysisColumns::from_analysis(analysis)?;
    let max_wait_ms = get_max_lock_wait_ms(pool).await?;
    let sql = &format!("{} AND status = ?", UPDATE_SQL.trim_end());

    let rows = retry_on_lock("save_analysis_if_status", max_wait_ms, move || async move {
        let result = columns
            .bind(sqlx::query(sql))
            .bind(expected.as_str())
            .execute(pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    })
    .await?;

    Ok(rows > 0)
}

/// Load an analysis by its client-facing id
pub async fn load_analysis(pool: &SqlitePool, analysis_id: Uuid) -> Result<Option<Analysis>> {
    let sql = format!("{} WHERE analysis_id = ?", SELECT_COLUMNS);

    let row = sqlx::query(&sql)
        .bind(analysis_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| row_to_analysis(&r)).transpose()
}

/// Load an analysis only if `owner` owns it
pub async fn load_owned_analysis(
    pool: &SqlitePool,
    owner: &Owner,
    analysis_id: Uuid,
) -> Result<Option<Analysis>> {
    Ok(load_analysis(pool, analysis_id)
        .await?
        .filter(|analysis| &analysis.owner == owner))
}

/// Page of an owner's analyses, newest first
pub async fn list_analyses_for_owner(
    pool: &SqlitePool,
    owner: &Owner,
    limit: i64,
    offset: i64,
) -> Result<Vec<Analysis>> {
    let (kind, id) = owner.to_columns();
    let sql = format!(
        "{} WHERE owner_kind = ? AND owner_id IS ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        SELECT_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(kind)
        .bind(id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_analysis).collect()
}

/// Number of analyses owned by `owner`
pub async fn count_analyses_for_owner(pool: &SqlitePool, owner: &Owner) -> Result<i64> {
    let (kind, id) = owner.to_columns();

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM analyses WHERE owner_kind = ? AND owner_id IS ?",
    )
    .bind(kind)
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// All of an owner's analyses in one batch, in creation order
pub async fn list_batch(pool: &SqlitePool, owner: &Owner, batch_id: Uuid) -> Result<Vec<Analysis>> {
    let (kind, id) = owner.to_columns();
    let sql = format!(
        "{} WHERE batch_id = ? AND owner_kind = ? AND owner_id IS ? ORDER BY id ASC",
        SELECT_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(batch_id.to_string())
        .bind(kind)
        .bind(id)
        .fetch_all(pool)
        .await?;

    rows.iter().map(row_to_analysis).collect()
}

/// Current status of each requested analysis that exists and is owned by `owner`
pub async fn load_statuses(
    pool: &SqlitePool,
    owner: &Owner,
    analysis_ids: &[Uuid],
) -> Result<HashMap<Uuid, AnalysisStatus>> {
    if analysis_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let (kind, id) = owner.to_columns();
    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT analysis_id, status FROM analyses WHERE owner_kind = ");
    builder.push_bind(kind);
    builder.push(" AND owner_id IS ");
    builder.push_bind(id);
    builder.push(" AND analysis_id IN (");
    let mut separated = builder.separated(", ");
    for analysis_id in analysis_ids {
        separated.push_bind(analysis_id.to_string());
    }
    separated.push_unseparated(")");

    let rows = builder.build().fetch_all(pool).await?;

    let mut statuses = HashMap::with_capacity(rows.len());
    for row in rows {
        let analysis_id: String = row.get("analysis_id");
        let status: String = row.get("status");
        statuses.insert(parse_uuid(&analysis_id)?, parse_status(&status)?);
    }

    Ok(statuses)
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse uuid '{}': {}", value, e)))
}

fn parse_status(value: &str) -> Result<AnalysisStatus> {
    value.parse::<AnalysisStatus>().map_err(Error::Internal)
}

/// Fixed-width RFC 3339, so text order in SQL matches time order
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn row_to_analysis(row: &SqliteRow) -> Result<Analysis> {
    let analysis_id: String = row.get("analysis_id");
    let batch_id: Option<String> = row.get("batch_id");

    let owner_kind: String = row.get("owner_kind");
    let owner_id: Option<String> = row.get("owner_id");
    let owner = Owner::from_columns(&owner_kind, owner_id)
        .ok_or_else(|| Error::Internal(format!("Invalid owner kind: {}", owner_kind)))?;

    let player_side: String = row.get("player_side");
    let player_side = player_side.parse().map_err(Error::Internal)?;

    let status: String = row.get("status");

    let result: Option<String> = row.get("result");
    let result: Option<AnalysisResult> = result
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize result: {}", e)))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let completed_at: Option<String> = row.get("completed_at");

    Ok(Analysis {
        analysis_id: parse_uuid(&analysis_id)?,
        batch_id: batch_id.as_deref().map(parse_uuid).transpose()?,
        owner,
        pgn: row.get("pgn"),
        file_ref: row.get("file_ref"),
        player_name: row.get("player_name"),
        player_side,
        white: row.get("white"),
        black: row.get("black"),
        outcome: row.get("outcome"),
        event: row.get("event"),
        date: row.get("date"),
        eco: row.get("eco"),
        opening: row.get("opening"),
        status: parse_status(&status)?,
        result,
        error: row.get("error"),
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
        completed_at: completed_at
            .as_deref()
            .map(|s| parse_timestamp(s, "completed_at"))
            .transpose()?,
    })
}
