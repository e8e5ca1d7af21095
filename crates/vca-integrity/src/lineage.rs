//! Lineage queries (SS4.9): read-only helpers over `data_lineage`, used
//! by audits and by the consistency checker to explain a violation.

use std::sync::Arc;

use vca_models::{LineageOperation, LineageRecord, VideoId};
use vca_models::{ContextId, LineageId};
use vca_store::{Row, SqlValue, Store};

use crate::error::IntegrityResult;

fn parse_operation(raw: &str) -> LineageOperation {
    match raw {
        "reprocess" => LineageOperation::Reprocess,
        _ => LineageOperation::Create,
    }
}

struct LineageRow {
    lineage_id: String,
    video_id: String,
    context_id: Option<String>,
    operation: String,
    tool_name: String,
    tool_version: String,
    model_version: Option<String>,
    parameters: Option<String>,
    user_id: Option<String>,
    timestamp: String,
}

impl LineageRow {
    fn into_record(self) -> LineageRecord {
        LineageRecord {
            lineage_id: LineageId::from_string(self.lineage_id),
            video_id: VideoId::from_string(self.video_id),
            context_id: self.context_id.map(ContextId::from_string),
            operation: parse_operation(&self.operation),
            tool_name: self.tool_name,
            tool_version: self.tool_version,
            model_version: self.model_version,
            parameters: self.parameters.and_then(|p| serde_json::from_str(&p).ok()),
            user_id: self.user_id,
            timestamp: self
                .timestamp
                .parse()
                .unwrap_or_else(|_| chrono::Utc::now()),
        }
    }
}

const LINEAGE_COLUMNS: &str =
    "lineage_id, video_id, context_id, operation, tool_name, tool_version, model_version, parameters, user_id, timestamp";

fn row_to_lineage(row: &Row<'_>) -> rusqlite::Result<LineageRow> {
    Ok(LineageRow {
        lineage_id: row.get(0)?,
        video_id: row.get(1)?,
        context_id: row.get(2)?,
        operation: row.get(3)?,
        tool_name: row.get(4)?,
        tool_version: row.get(5)?,
        model_version: row.get(6)?,
        parameters: row.get(7)?,
        user_id: row.get(8)?,
        timestamp: row.get(9)?,
    })
}

pub struct LineageQueries {
    store: Arc<Store>,
}

impl LineageQueries {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// "Who produced this context record" - at most one row in the
    /// common case, but `INSERT OR IGNORE` idempotency plus reprocessing
    /// means a context_id could in principle gain a second lineage row
    /// recording a reprocess, so this returns all matches ordered by time.
    pub async fn producers_of(&self, context_id: &ContextId) -> IntegrityResult<Vec<LineageRecord>> {
        let store = Arc::clone(&self.store);
        let id = context_id.as_str().to_string();
        let rows = tokio::task::spawn_blocking(move || {
            store.execute_query(
                &format!("SELECT {LINEAGE_COLUMNS} FROM data_lineage WHERE context_id = ?1 ORDER BY timestamp ASC"),
                &[SqlValue::Text(id)],
                row_to_lineage,
            )
        })
        .await
        .expect("blocking task panicked")?;

        Ok(rows.into_iter().map(LineageRow::into_record).collect())
    }

    /// Every lineage record for one video, most recent first - the
    /// audit trail backing `GET /integrity/lineage/{video_id}`.
    pub async fn for_video(&self, video_id: &VideoId) -> IntegrityResult<Vec<LineageRecord>> {
        let store = Arc::clone(&self.store);
        let id = video_id.as_str().to_string();
        let rows = tokio::task::spawn_blocking(move || {
            store.execute_query(
                &format!("SELECT {LINEAGE_COLUMNS} FROM data_lineage WHERE video_id = ?1 ORDER BY timestamp DESC"),
                &[SqlValue::Text(id)],
                row_to_lineage,
            )
        })
        .await
        .expect("blocking task panicked")?;

        Ok(rows.into_iter().map(LineageRow::into_record).collect())
    }

    /// "What has tool X written for video Y", most recent first.
    pub async fn written_by_tool(&self, video_id: &VideoId, tool_name: &str) -> IntegrityResult<Vec<LineageRecord>> {
        let store = Arc::clone(&self.store);
        let id = video_id.as_str().to_string();
        let tool = tool_name.to_string();
        let rows = tokio::task::spawn_blocking(move || {
            store.execute_query(
                &format!("SELECT {LINEAGE_COLUMNS} FROM data_lineage WHERE video_id = ?1 AND tool_name = ?2 ORDER BY timestamp DESC"),
                &[SqlValue::Text(id), SqlValue::Text(tool)],
                row_to_lineage,
            )
        })
        .await
        .expect("blocking task panicked")?;

        Ok(rows.into_iter().map(LineageRow::into_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vca_store::PoolConfig;

    fn test_store() -> Arc<Store> {
        Arc::new(
            Store::open(PoolConfig {
                database_path: ":memory:".to_string(),
                pool_size: 2,
                ..PoolConfig::default()
            })
            .unwrap(),
        )
    }

    fn insert_video(store: &Store, video_id: &str) {
        store
            .execute_update(
                "INSERT INTO videos (video_id, filename, file_path, duration, upload_timestamp) VALUES (?1, 'a.mp4', '/tmp/a.mp4', 60.0, ?2)",
                &[SqlValue::Text(video_id.into()), SqlValue::Text(Utc::now().to_rfc3339())],
            )
            .unwrap();
    }

    fn insert_lineage(store: &Store, video_id: &str, context_id: &str, tool_name: &str) {
        store
            .execute_update(
                "INSERT INTO data_lineage (lineage_id, video_id, context_id, operation, tool_name, tool_version, timestamp) \
                 VALUES (?1, ?2, ?3, 'create', ?4, '1', ?5)",
                &[
                    SqlValue::Text(uuid::Uuid::new_v4().to_string()),
                    SqlValue::Text(video_id.into()),
                    SqlValue::Text(context_id.into()),
                    SqlValue::Text(tool_name.into()),
                    SqlValue::Text(Utc::now().to_rfc3339()),
                ],
            )
            .unwrap();
    }

    #[tokio::test]
    async fn written_by_tool_returns_matching_rows_only() {
        let store = test_store();
        insert_video(&store, "v1");
        insert_lineage(&store, "v1", "c1", "caption_frames");
        insert_lineage(&store, "v1", "c2", "extract_frames");

        let queries = LineageQueries::new(store);
        let rows = queries.written_by_tool(&VideoId::from_string("v1"), "caption_frames").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tool_name, "caption_frames");
    }

    #[tokio::test]
    async fn for_video_returns_every_record_regardless_of_tool() {
        let store = test_store();
        insert_video(&store, "v1");
        insert_lineage(&store, "v1", "c1", "caption_frames");
        insert_lineage(&store, "v1", "c2", "extract_frames");

        let queries = LineageQueries::new(store);
        let rows = queries.for_video(&VideoId::from_string("v1")).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn producers_of_finds_the_writing_lineage_record() {
        let store = test_store();
        insert_video(&store, "v1");
        insert_lineage(&store, "v1", "c1", "caption_frames");

        let queries = LineageQueries::new(store);
        let rows = queries.producers_of(&ContextId::from_string("c1")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].video_id.as_str(), "v1");
    }
}
