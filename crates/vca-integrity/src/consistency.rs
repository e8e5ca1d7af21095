//! Consistency checker (SS4.9): re-derives SS8's invariants 1-3 from
//! stored rows, independent of the live write path. Never mutates.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use vca_models::{ContextPayload, VideoId};
use vca_store::{SqlValue, Store};
use vca_validator::validate_batch;

use crate::error::{IntegrityError, IntegrityResult};

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    OrphanContext { context_id: String, video_id: String },
    NonMonotonicTimestamp {
        video_id: String,
        context_type: String,
        context_id: String,
        timestamp: f64,
        previous_timestamp: f64,
    },
    InvalidPayload { context_id: String, video_id: String, reason: String },
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ConsistencyReport {
    pub video_id: String,
    pub rows_checked: usize,
    pub violations: Vec<Violation>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

struct ContextRow {
    context_id: String,
    context_type: String,
    timestamp: Option<f64>,
    data: String,
}

pub struct ConsistencyChecker {
    store: Arc<Store>,
}

impl ConsistencyChecker {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Re-derives invariants 1-3 of SS8 for one video: no orphan rows,
    /// non-decreasing `timestamp` per `context_type` in insertion
    /// order, and every payload re-validating against B.
    pub async fn check_video(&self, video_id: &VideoId) -> IntegrityResult<ConsistencyReport> {
        let store = Arc::clone(&self.store);
        let id = video_id.as_str().to_string();

        let (duration, rows) = tokio::task::spawn_blocking(move || -> vca_store::StoreResult<_> {
            let duration: Vec<f64> = store.execute_query(
                "SELECT duration FROM videos WHERE video_id = ?1",
                &[SqlValue::Text(id.clone())],
                |row| row.get(0),
            )?;
            let rows = store.execute_query(
                "SELECT context_id, context_type, timestamp, data FROM video_context \
                 WHERE video_id = ?1 ORDER BY context_type, created_at ASC",
                &[SqlValue::Text(id)],
                |row| {
                    Ok(ContextRow {
                        context_id: row.get(0)?,
                        context_type: row.get(1)?,
                        timestamp: row.get(2)?,
                        data: row.get(3)?,
                    })
                },
            )?;
            Ok((duration, rows))
        })
        .await
        .expect("blocking task panicked")?;

        let Some(duration) = duration.into_iter().next() else {
            return Err(IntegrityError::VideoNotFound(video_id.as_str().to_string()));
        };

        let mut violations = Vec::new();
        let mut last_by_type: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
        let rows_checked = rows.len();

        for row in rows {
            if row.context_type == "idempotency" {
                continue;
            }

            match row.timestamp {
                Some(ts) => {
                    if let Some(&previous) = last_by_type.get(&row.context_type) {
                        if ts < previous {
                            violations.push(Violation::NonMonotonicTimestamp {
                                video_id: video_id.as_str().to_string(),
                                context_type: row.context_type.clone(),
                                context_id: row.context_id.clone(),
                                timestamp: ts,
                                previous_timestamp: previous,
                            });
                        }
                    }
                    last_by_type.insert(row.context_type.clone(), ts);
                }
                None => {}
            }

            match serde_json::from_str::<ContextPayload>(&row.data) {
                Ok(payload) => {
                    if let Err(e) = validate_batch(&[payload], None, &[], Some(duration)) {
                        violations.push(Violation::InvalidPayload {
                            context_id: row.context_id.clone(),
                            video_id: video_id.as_str().to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
                Err(e) => violations.push(Violation::InvalidPayload {
                    context_id: row.context_id.clone(),
                    video_id: video_id.as_str().to_string(),
                    reason: format!("unparseable payload: {e}"),
                }),
            }
        }

        Ok(ConsistencyReport {
            video_id: video_id.as_str().to_string(),
            rows_checked,
            violations,
        })
    }

    /// `check_video` over every non-deleted video, plus one synthetic
    /// report for rows in `video_context` with no matching `videos`
    /// row (invariant 1) - structurally prevented by the schema's
    /// foreign key today, but re-derived here defensively since the
    /// checker's job is to trust nothing about the write path.
    pub async fn check_all(&self) -> IntegrityResult<Vec<ConsistencyReport>> {
        let store = Arc::clone(&self.store);
        let (video_ids, orphans) = tokio::task::spawn_blocking(move || -> vca_store::StoreResult<_> {
            let video_ids: Vec<String> = store.execute_query(
                "SELECT video_id FROM videos WHERE deleted_at IS NULL",
                &[],
                |row| row.get(0),
            )?;
            let orphans: Vec<(String, String)> = store.execute_query(
                "SELECT vc.context_id, vc.video_id FROM video_context vc \
                 LEFT JOIN videos v ON vc.video_id = v.video_id WHERE v.video_id IS NULL",
                &[],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok((video_ids, orphans))
        })
        .await
        .expect("blocking task panicked")?;

        let mut reports = Vec::with_capacity(video_ids.len() + 1);
        for video_id in video_ids {
            reports.push(self.check_video(&VideoId::from_string(video_id)).await?);
        }

        if !orphans.is_empty() {
            reports.push(ConsistencyReport {
                video_id: "<orphans>".to_string(),
                rows_checked: orphans.len(),
                violations: orphans
                    .into_iter()
                    .map(|(context_id, video_id)| Violation::OrphanContext { context_id, video_id })
                    .collect(),
            });
        }

        Ok(reports)
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

    fn insert_caption(store: &Store, video_id: &str, timestamp: f64, text: &str) {
        let payload = serde_json::json!({"context_type": "caption", "frame_timestamp": timestamp, "text": text});
        store
            .execute_update(
                "INSERT INTO video_context (context_id, video_id, context_type, timestamp, data, tool_name, tool_version, created_at) \
                 VALUES (?1, ?2, 'caption', ?3, ?4, 'caption_frames', '1', ?5)",
                &[
                    SqlValue::Text(uuid::Uuid::new_v4().to_string()),
                    SqlValue::Text(video_id.into()),
                    SqlValue::Real(timestamp),
                    SqlValue::Text(payload.to_string()),
                    SqlValue::Text(Utc::now().to_rfc3339()),
                ],
            )
            .unwrap();
    }

    #[tokio::test]
    async fn clean_video_has_no_violations() {
        let store = test_store();
        insert_video(&store, "v1");
        insert_caption(&store, "v1", 1.0, "hello");
        insert_caption(&store, "v1", 2.0, "world");

        let checker = ConsistencyChecker::new(store);
        let report = checker.check_video(&VideoId::from_string("v1")).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.rows_checked, 2);
    }

    #[tokio::test]
    async fn detects_non_monotonic_timestamp() {
        let store = test_store();
        insert_video(&store, "v1");
        insert_caption(&store, "v1", 5.0, "first");
        insert_caption(&store, "v1", 1.0, "second");

        let checker = ConsistencyChecker::new(store);
        let report = checker.check_video(&VideoId::from_string("v1")).await.unwrap();
        assert!(!report.is_clean());
        assert!(matches!(report.violations[0], Violation::NonMonotonicTimestamp { .. }));
    }

    #[tokio::test]
    async fn detects_invalid_payload() {
        let store = test_store();
        insert_video(&store, "v1");
        insert_caption(&store, "v1", 1.0, "   ");

        let checker = ConsistencyChecker::new(store);
        let report = checker.check_video(&VideoId::from_string("v1")).await.unwrap();
        assert!(!report.is_clean());
        assert!(matches!(report.violations[0], Violation::InvalidPayload { .. }));
    }
}
