//! Component D: the single writer of `ContextRecord`s (SS4.4).
//!
//! Every analysis result reaches the store through
//! `PersistenceService::store_tool_results`. Nothing else in the
//! workspace is allowed to write to `video_context` or `data_lineage`.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use vca_models::{ContextId, ContextPayload, ContextType, LineageRecord, VideoId};
use vca_store::{SqlValue, Store, StoreError};
use vca_validator::{validate_batch, ValidationError};

use crate::error::{PersistenceError, PersistenceResult};
use crate::retry::with_fixed_backoff;

/// `{kind: count}` as returned by `store_tool_results` (SS4.4).
pub type KindCounts = BTreeMap<String, i64>;

#[derive(Debug, Clone)]
pub struct CompletenessReport {
    pub counts: KindCounts,
    pub complete: bool,
    pub missing: Vec<String>,
}

pub struct PersistenceService {
    store: Arc<Store>,
}

fn context_type_for_tool(tool_name: &str) -> Option<ContextType> {
    match tool_name {
        "extract_frames" => Some(ContextType::Frame),
        "caption_frames" => Some(ContextType::Caption),
        "transcribe_audio" => Some(ContextType::Transcript),
        "detect_objects" => Some(ContextType::Object),
        _ => None,
    }
}

/// A deterministic id so an idempotency sentinel for the same
/// `(video_id, tool_name, idempotency_key)` always maps to the same
/// primary key, making `INSERT OR IGNORE` an effective no-op on retry.
fn idempotency_sentinel_id(video_id: &str, tool_name: &str, idempotency_key: &str) -> ContextId {
    let mut hasher = DefaultHasher::new();
    (video_id, tool_name, idempotency_key).hash(&mut hasher);
    ContextId::from_string(format!("idem-{:016x}", hasher.finish()))
}

impl PersistenceService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// SS4.4 contract, steps 1-7.
    pub async fn store_tool_results(
        &self,
        video_id: &VideoId,
        tool_name: &str,
        payloads: Vec<ContextPayload>,
        tool_version: &str,
        model_version: Option<String>,
        processing_params: Option<serde_json::Value>,
        idempotency_key: Option<String>,
    ) -> PersistenceResult<KindCounts> {
        let context_type =
            context_type_for_tool(tool_name).ok_or_else(|| PersistenceError::UnknownTool(tool_name.to_string()))?;

        // Step 1: idempotency short-circuit.
        if let Some(key) = &idempotency_key {
            let sentinel_id = idempotency_sentinel_id(video_id.as_str(), tool_name, key);
            if self.sentinel_exists(&sentinel_id).await? {
                info!(video_id = %video_id, tool_name, "idempotency key already processed, skipping write");
                let count = self.count_for_kind(video_id, context_type).await?;
                let mut counts = KindCounts::new();
                counts.insert(context_type.as_str().to_string(), count);
                return Ok(counts);
            }
        }

        // Step 3: validate before touching the store; no partial writes.
        self.check_video_exists_and_validate(video_id, &payloads).await?;

        let batch_size = payloads.len() as i64;
        let video_id = video_id.clone();
        let tool_name = tool_name.to_string();
        let tool_version = tool_version.to_string();

        let write_result = with_fixed_backoff("store_tool_results", || {
            let store = Arc::clone(&self.store);
            let video_id = video_id.clone();
            let tool_name = tool_name.clone();
            let tool_version = tool_version.clone();
            let model_version = model_version.clone();
            let processing_params = processing_params.clone();
            let payloads = payloads.clone();
            async move {
                write_batch_once(
                    store,
                    video_id,
                    context_type,
                    payloads,
                    tool_name,
                    tool_version,
                    model_version,
                    processing_params,
                    batch_size,
                )
                .await
            }
        })
        .await?;

        // Step 6: sentinel write, after commit, also best-effort in the
        // sense that losing it only risks a redundant re-processing.
        if let Some(key) = &idempotency_key {
            let sentinel_id = idempotency_sentinel_id(write_result.video_id.as_str(), &write_result.tool_name, key);
            self.write_sentinel(&sentinel_id, &write_result, key).await?;
        }

        let mut counts = KindCounts::new();
        counts.insert(context_type.as_str().to_string(), write_result.post_count);
        Ok(counts)
    }

    async fn sentinel_exists(&self, sentinel_id: &ContextId) -> PersistenceResult<bool> {
        let store = Arc::clone(&self.store);
        let id = sentinel_id.as_str().to_string();
        let rows = run_blocking(move || {
            store.execute_query(
                "SELECT 1 FROM video_context WHERE context_id = ?1",
                &[SqlValue::Text(id)],
                |row| row.get::<_, i64>(0),
            )
        })
        .await?;
        Ok(!rows.is_empty())
    }

    async fn write_sentinel(
        &self,
        sentinel_id: &ContextId,
        write_result: &WriteOutcome,
        idempotency_key: &str,
    ) -> PersistenceResult<()> {
        let store = Arc::clone(&self.store);
        let data = serde_json::to_string(&vca_models::IdempotencyPayload {
            tool_name: write_result.tool_name.clone(),
            idempotency_key: idempotency_key.to_string(),
        })?;
        let video_id = write_result.video_id.as_str().to_string();
        let tool_name = write_result.tool_name.clone();
        let tool_version = write_result.tool_version.clone();
        let sentinel_id = sentinel_id.as_str().to_string();
        run_blocking(move || {
            store.execute_update(
                "INSERT OR IGNORE INTO video_context \
                 (context_id, video_id, context_type, timestamp, data, tool_name, tool_version, model_version, processing_params, created_at) \
                 VALUES (?1, ?2, 'idempotency', NULL, ?3, ?4, ?5, NULL, NULL, ?6)",
                &[
                    SqlValue::Text(sentinel_id),
                    SqlValue::Text(video_id),
                    SqlValue::Text(data),
                    SqlValue::Text(tool_name),
                    SqlValue::Text(tool_version),
                    SqlValue::Text(Utc::now().to_rfc3339()),
                ],
            )
        })
        .await?;
        Ok(())
    }

    async fn check_video_exists_and_validate(
        &self,
        video_id: &VideoId,
        payloads: &[ContextPayload],
    ) -> PersistenceResult<()> {
        let store = Arc::clone(&self.store);
        let id = video_id.as_str().to_string();
        let duration = run_blocking(move || {
            store.execute_query(
                "SELECT duration FROM videos WHERE video_id = ?1 AND deleted_at IS NULL",
                &[SqlValue::Text(id)],
                |row| row.get::<_, f64>(0),
            )
        })
        .await?;

        let Some(duration) = duration.into_iter().next() else {
            return Err(ValidationError::UnknownVideo(video_id.as_str().to_string()).into());
        };

        validate_batch(payloads, None, &[], Some(duration))?;
        Ok(())
    }

    async fn count_for_kind(&self, video_id: &VideoId, context_type: ContextType) -> PersistenceResult<i64> {
        let store = Arc::clone(&self.store);
        let id = video_id.as_str().to_string();
        let kind = context_type.as_str().to_string();
        let rows = run_blocking(move || {
            store.execute_query(
                "SELECT COUNT(*) FROM video_context WHERE video_id = ?1 AND context_type = ?2",
                &[SqlValue::Text(id), SqlValue::Text(kind)],
                |row| row.get::<_, i64>(0),
            )
        })
        .await?;
        Ok(rows.into_iter().next().unwrap_or(0))
    }

    /// SS4.4: `{frame, caption, transcript, object}` counts plus whether
    /// every kind is present.
    pub async fn verify_video_data_completeness(&self, video_id: &VideoId) -> PersistenceResult<CompletenessReport> {
        const KINDS: [ContextType; 4] = [
            ContextType::Frame,
            ContextType::Caption,
            ContextType::Transcript,
            ContextType::Object,
        ];

        let mut counts = KindCounts::new();
        let mut missing = Vec::new();
        for kind in KINDS {
            let count = self.count_for_kind(video_id, kind).await?;
            counts.insert(kind.as_str().to_string(), count);
            if count == 0 {
                missing.push(kind.as_str().to_string());
            }
        }

        Ok(CompletenessReport {
            complete: missing.is_empty(),
            counts,
            missing,
        })
    }

    /// Removes every `ContextRecord` for `video_id`; lineage is retained.
    pub async fn delete_video_data(&self, video_id: &VideoId) -> PersistenceResult<usize> {
        let store = Arc::clone(&self.store);
        let id = video_id.as_str().to_string();
        let affected = run_blocking(move || {
            store.transaction(|tx| {
                Ok(tx.execute(
                    "DELETE FROM video_context WHERE video_id = ?1",
                    &[SqlValue::Text(id)],
                )?)
            })
        })
        .await?;
        Ok(affected)
    }
}

struct WriteOutcome {
    video_id: VideoId,
    tool_name: String,
    tool_version: String,
    post_count: i64,
}

#[allow(clippy::too_many_arguments)]
async fn write_batch_once(
    store: Arc<Store>,
    video_id: VideoId,
    context_type: ContextType,
    payloads: Vec<ContextPayload>,
    tool_name: String,
    tool_version: String,
    model_version: Option<String>,
    processing_params: Option<serde_json::Value>,
    batch_size: i64,
) -> PersistenceResult<WriteOutcome> {
    let video_id_for_lineage = video_id.clone();
    let tool_name_for_lineage = tool_name.clone();
    let tool_version_for_lineage = tool_version.clone();

    let (post_count, context_ids) = run_blocking({
        let store = Arc::clone(&store);
        let video_id = video_id.clone();
        let tool_name = tool_name.clone();
        let tool_version = tool_version.clone();
        move || {
            store.transaction(|tx| {
                let sp = tx.savepoint()?;

                let kind = context_type.as_str().to_string();
                let pre_count: i64 = tx
                    .query(
                        "SELECT COUNT(*) FROM video_context WHERE video_id = ?1 AND context_type = ?2",
                        &[SqlValue::Text(video_id.as_str().to_string()), SqlValue::Text(kind.clone())],
                        |row| row.get(0),
                    )?
                    .into_iter()
                    .next()
                    .unwrap_or(0);

                let mut context_ids = Vec::with_capacity(payloads.len());
                let now = Utc::now().to_rfc3339();
                for payload in &payloads {
                    let context_id = ContextId::new();
                    let data = serde_json::to_string(payload)?;
                    let timestamp = payload.primary_timestamp();
                    tx.execute(
                        "INSERT OR IGNORE INTO video_context \
                         (context_id, video_id, context_type, timestamp, data, tool_name, tool_version, model_version, processing_params, created_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                        &[
                            SqlValue::Text(context_id.as_str().to_string()),
                            SqlValue::Text(video_id.as_str().to_string()),
                            SqlValue::Text(kind.clone()),
                            timestamp.map(SqlValue::Real).unwrap_or(SqlValue::Null),
                            SqlValue::Text(data),
                            SqlValue::Text(tool_name.clone()),
                            SqlValue::Text(tool_version.clone()),
                            model_version.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                            processing_params
                                .clone()
                                .map(|p| SqlValue::Text(p.to_string()))
                                .unwrap_or(SqlValue::Null),
                            SqlValue::Text(now.clone()),
                        ],
                    )?;
                    context_ids.push(context_id);
                }

                let post_count: i64 = tx
                    .query(
                        "SELECT COUNT(*) FROM video_context WHERE video_id = ?1 AND context_type = ?2",
                        &[SqlValue::Text(video_id.as_str().to_string()), SqlValue::Text(kind.clone())],
                        |row| row.get(0),
                    )?
                    .into_iter()
                    .next()
                    .unwrap_or(0);

                if post_count - pre_count < batch_size {
                    tx.rollback_to(&sp)?;
                    tx.release(sp)?;
                    return Err(StoreError::internal(format!(
                        "expected row count to advance by {batch_size}, advanced by {}",
                        post_count - pre_count
                    ))
                    .into());
                }

                tx.release(sp)?;
                Ok((post_count, context_ids))
            })
        }
    })
    .await?;

    // Step 5: lineage is best-effort; a failure here is logged and does
    // not roll back the data write (SS4.4 step 5, SS9 open question).
    if let Err(e) = write_lineage_batch(
        Arc::clone(&store),
        video_id_for_lineage.clone(),
        context_ids,
        tool_name_for_lineage,
        tool_version_for_lineage,
    )
    .await
    {
        error!(video_id = %video_id_for_lineage, error = %e, "best-effort lineage write failed");
    }

    Ok(WriteOutcome {
        video_id,
        tool_name,
        tool_version,
        post_count,
    })
}

async fn write_lineage_batch(
    store: Arc<Store>,
    video_id: VideoId,
    context_ids: Vec<ContextId>,
    tool_name: String,
    tool_version: String,
) -> PersistenceResult<()> {
    let records: Vec<LineageRecord> = context_ids
        .into_iter()
        .map(|context_id| LineageRecord::new_create(video_id.clone(), Some(context_id), tool_name.clone(), tool_version.clone()))
        .collect();

    if records.is_empty() {
        return Ok(());
    }

    let params: Vec<Vec<SqlValue>> = records
        .iter()
        .map(|record| {
            vec![
                SqlValue::Text(record.lineage_id.as_str().to_string()),
                SqlValue::Text(record.video_id.as_str().to_string()),
                record
                    .context_id
                    .as_ref()
                    .map(|id| SqlValue::Text(id.as_str().to_string()))
                    .unwrap_or(SqlValue::Null),
                SqlValue::Text(record.operation.as_str().to_string()),
                SqlValue::Text(record.tool_name.clone()),
                SqlValue::Text(record.tool_version.clone()),
                record.model_version.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                record
                    .parameters
                    .clone()
                    .map(|p| SqlValue::Text(p.to_string()))
                    .unwrap_or(SqlValue::Null),
                record.user_id.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
                SqlValue::Text(record.timestamp.to_rfc3339()),
            ]
        })
        .collect();

    run_blocking(move || {
        store.execute_batch(
            "INSERT INTO data_lineage \
             (lineage_id, video_id, context_id, operation, tool_name, tool_version, model_version, parameters, user_id, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            &params,
            50,
        )
    })
    .await?;
    Ok(())
}

async fn run_blocking<F, T>(f: F) -> PersistenceResult<T>
where
    F: FnOnce() -> Result<T, vca_store::StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PersistenceError::Join(e.to_string()))?
        .map_err(PersistenceError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vca_models::{CaptionPayload, FramePayload};
    use vca_store::PoolConfig;

    fn test_service() -> PersistenceService {
        let store = Store::open(PoolConfig {
            database_path: ":memory:".to_string(),
            pool_size: 2,
            ..PoolConfig::default()
        })
        .unwrap();
        store
            .execute_update(
                "INSERT INTO videos (video_id, filename, file_path, duration, upload_timestamp) VALUES (?1, 'a.mp4', '/tmp/a.mp4', 60.0, ?2)",
                &[SqlValue::Text("v1".into()), SqlValue::Text(Utc::now().to_rfc3339())],
            )
            .unwrap();
        PersistenceService::new(Arc::new(store))
    }

    fn frame(ts: f64) -> ContextPayload {
        ContextPayload::Frame(FramePayload {
            timestamp: ts,
            frame_number: ts as u64,
            image_path: Some(format!("/tmp/frame_{ts}.jpg")),
            image_base64: None,
            width: None,
            height: None,
        })
    }

    fn caption(ts: f64, text: &str) -> ContextPayload {
        ContextPayload::Caption(CaptionPayload {
            frame_timestamp: ts,
            text: text.to_string(),
            confidence: Some(0.9),
            model_version: None,
        })
    }

    #[tokio::test]
    async fn stores_a_fresh_batch_and_reports_the_count() {
        let service = test_service();
        let video_id = VideoId::from_string("v1".to_string());
        let counts = service
            .store_tool_results(
                &video_id,
                "extract_frames",
                vec![frame(0.0), frame(1.0), frame(2.0)],
                "1.0.0",
                None,
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(counts.get("frame"), Some(&3));
    }

    #[tokio::test]
    async fn unknown_tool_name_is_rejected() {
        let service = test_service();
        let video_id = VideoId::from_string("v1".to_string());
        let err = service
            .store_tool_results(&video_id, "not_a_tool", vec![], "1.0.0", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn unknown_video_is_rejected() {
        let service = test_service();
        let video_id = VideoId::from_string("missing".to_string());
        let err = service
            .store_tool_results(&video_id, "extract_frames", vec![frame(0.0)], "1.0.0", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Validation(ValidationError::UnknownVideo(_))));
    }

    #[tokio::test]
    async fn idempotency_key_short_circuits_second_write() {
        let service = test_service();
        let video_id = VideoId::from_string("v1".to_string());
        let key = Some("job-1".to_string());

        let first = service
            .store_tool_results(
                &video_id,
                "caption_frames",
                vec![caption(0.0, "a"), caption(1.0, "b")],
                "1.0.0",
                None,
                None,
                key.clone(),
            )
            .await
            .unwrap();
        assert_eq!(first.get("caption"), Some(&2));

        let second = service
            .store_tool_results(
                &video_id,
                "caption_frames",
                vec![caption(0.0, "a"), caption(1.0, "b"), caption(2.0, "c")],
                "1.0.0",
                None,
                None,
                key,
            )
            .await
            .unwrap();
        // second call is skipped entirely; count reflects the first write only
        assert_eq!(second.get("caption"), Some(&2));
    }

    #[tokio::test]
    async fn completeness_report_lists_missing_kinds() {
        let service = test_service();
        let video_id = VideoId::from_string("v1".to_string());
        service
            .store_tool_results(&video_id, "extract_frames", vec![frame(0.0)], "1.0.0", None, None, None)
            .await
            .unwrap();

        let report = service.verify_video_data_completeness(&video_id).await.unwrap();
        assert!(!report.complete);
        assert!(report.missing.contains(&"caption".to_string()));
        assert!(!report.missing.contains(&"frame".to_string()));
    }

    #[tokio::test]
    async fn delete_video_data_removes_context_but_keeps_lineage() {
        let service = test_service();
        let video_id = VideoId::from_string("v1".to_string());
        service
            .store_tool_results(&video_id, "extract_frames", vec![frame(0.0)], "1.0.0", None, None, None)
            .await
            .unwrap();

        let affected = service.delete_video_data(&video_id).await.unwrap();
        assert_eq!(affected, 1);

        let report = service.verify_video_data_completeness(&video_id).await.unwrap();
        assert_eq!(report.counts.get("frame"), Some(&0));
    }
}
