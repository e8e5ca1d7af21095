//! Component F: the progressive per-video processor (SS4.6).
//!
//! Advances a video through EXTRACTING -> CAPTIONING -> ANALYZING,
//! updating `processing_status` on entry to each stage and emitting a
//! progress event to any subscriber. The processor never writes
//! `ContextRecord`s itself - tools do, via the dispatcher (E) and the
//! persistence service (D); its only store mutation is
//! `processing_status`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{error, warn};
use vca_models::{ProcessingStatus, VideoId};
use vca_store::{SqlValue, Store};
use vca_tools::Dispatcher;

use crate::error::ProcessorResult;
use crate::progress::{ProgressEvent, Stage};

const PROGRESS_CHANNEL_CAPACITY: usize = 256;

pub struct ProgressiveProcessor {
    dispatcher: Arc<Dispatcher>,
    store: Arc<Store>,
    progress_tx: broadcast::Sender<ProgressEvent>,
    active: Mutex<HashMap<VideoId, ProgressEvent>>,
}

impl ProgressiveProcessor {
    pub fn new(dispatcher: Arc<Dispatcher>, store: Arc<Store>) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            dispatcher,
            store,
            progress_tx,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    /// `None` once the video has reached a terminal stage and been
    /// removed from the active set (SS4.6).
    pub fn get_progress(&self, video_id: &VideoId) -> Option<ProgressEvent> {
        self.active.lock().unwrap().get(video_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    pub async fn process(&self, video_id: VideoId, video_path: String) -> ProcessorResult<()> {
        self.emit(video_id.clone(), Stage::Extracting, 0, "starting frame extraction".to_string(), None);
        self.set_status(&video_id, ProcessingStatus::Extracting).await?;

        let extract_params = serde_json::json!({ "video_path": video_path });
        if let Err(e) = self.dispatcher.invoke("extract_frames", &video_id, extract_params, None).await {
            return self.fail(video_id, "extracting", e.to_string()).await;
        }
        self.emit(video_id.clone(), Stage::Extracting, 33, "frame extraction complete".to_string(), None);

        self.set_status(&video_id, ProcessingStatus::Captioning).await?;
        if let Err(e) = self
            .dispatcher
            .invoke("caption_frames", &video_id, serde_json::json!({}), None)
            .await
        {
            return self.fail(video_id, "captioning", e.to_string()).await;
        }
        self.emit(video_id.clone(), Stage::Captioning, 66, "captioning complete".to_string(), None);

        self.set_status(&video_id, ProcessingStatus::Analyzing).await?;
        self.emit(video_id.clone(), Stage::Analyzing, 90, "transcribing audio and detecting objects".to_string(), None);
        let (transcript_result, object_result) = tokio::join!(
            self.dispatcher.invoke("transcribe_audio", &video_id, serde_json::json!({}), None),
            self.dispatcher.invoke("detect_objects", &video_id, serde_json::json!({}), None),
        );

        let mut counts = BTreeMap::new();
        let mut any_succeeded = false;
        match transcript_result {
            Ok(outcome) => {
                any_succeeded = true;
                counts.extend(outcome.counts);
            }
            Err(e) => warn!(video_id = %video_id, error = %e, "transcribe_audio sub-task failed"),
        }
        match object_result {
            Ok(outcome) => {
                any_succeeded = true;
                counts.extend(outcome.counts);
            }
            Err(e) => warn!(video_id = %video_id, error = %e, "detect_objects sub-task failed"),
        }

        if !any_succeeded {
            return self
                .fail(
                    video_id,
                    "analyzing",
                    "both transcribe_audio and detect_objects failed".to_string(),
                )
                .await;
        }

        self.set_status(&video_id, ProcessingStatus::Complete).await?;
        self.emit(video_id.clone(), Stage::Complete, 100, "processing complete".to_string(), Some(counts));
        self.active.lock().unwrap().remove(&video_id);
        Ok(())
    }

    async fn fail(&self, video_id: VideoId, stage: &'static str, reason: String) -> ProcessorResult<()> {
        error!(video_id = %video_id, stage, reason, "progressive processing stage failed");
        if let Err(e) = self.set_status(&video_id, ProcessingStatus::Error).await {
            error!(video_id = %video_id, error = %e, "failed to persist error status after stage failure");
        }
        self.emit(video_id.clone(), Stage::Error, 100, format!("{stage} failed: {reason}"), None);
        self.active.lock().unwrap().remove(&video_id);
        Err(crate::error::ProcessorError::StageFailed(stage, reason))
    }

    fn emit(&self, video_id: VideoId, stage: Stage, percent: u8, message: String, counts: Option<BTreeMap<String, i64>>) {
        let event = ProgressEvent {
            video_id: video_id.clone(),
            stage,
            percent,
            message,
            counts,
            timestamp: Utc::now(),
        };
        self.active.lock().unwrap().insert(video_id, event.clone());
        let _ = self.progress_tx.send(event);
    }

    async fn set_status(&self, video_id: &VideoId, status: ProcessingStatus) -> ProcessorResult<()> {
        let store = Arc::clone(&self.store);
        let id = video_id.as_str().to_string();
        let status_str = status.as_str().to_string();
        tokio::task::spawn_blocking(move || {
            store.execute_update(
                "UPDATE videos SET processing_status = ?1 WHERE video_id = ?2",
                &[SqlValue::Text(status_str), SqlValue::Text(id)],
            )
        })
        .await
        .map_err(|e| crate::error::ProcessorError::StageFailed("status_update", format!("join error: {e}")))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vca_cache::{Cache, CacheConfig};
    use vca_persistence::PersistenceService;
    use vca_store::PoolConfig;
    use vca_tools::{DispatcherConfig, ToolRegistry, ToolRunnerClient, ToolRunnerConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_processor(tool_runner_url: String) -> (Arc<Store>, ProgressiveProcessor) {
        let store = Arc::new(
            Store::open(PoolConfig {
                database_path: ":memory:".to_string(),
                pool_size: 2,
                ..PoolConfig::default()
            })
            .unwrap(),
        );
        store
            .execute_update(
                "INSERT INTO videos (video_id, filename, file_path, duration, upload_timestamp) VALUES (?1, 'a.mp4', '/tmp/a.mp4', 60.0, ?2)",
                &[SqlValue::Text("v1".into()), SqlValue::Text(Utc::now().to_rfc3339())],
            )
            .unwrap();

        let cache = Arc::new(Cache::new(CacheConfig::default()).unwrap());
        let persistence = Arc::new(PersistenceService::new(Arc::clone(&store)));
        let rpc = Arc::new(
            ToolRunnerClient::new(ToolRunnerConfig {
                base_url: tool_runner_url,
                ..ToolRunnerConfig::from_env()
            })
            .unwrap(),
        );
        let registry = Arc::new(ToolRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry,
            cache,
            persistence,
            Arc::clone(&store),
            rpc,
            DispatcherConfig::default(),
        ));

        (Arc::clone(&store), ProgressiveProcessor::new(dispatcher, store))
    }

    #[tokio::test]
    async fn full_stage_progression_reaches_complete() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract_frames"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"timestamp": 0.0, "frame_number": 0, "image_path": "/tmp/f0.jpg"}
            ])))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/caption_frames"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"frame_timestamp": 0.0, "text": "a cat on a couch"}
            ])))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/transcribe_audio"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"start": 0.0, "end": 1.0, "text": "hello"}
            ])))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/detect_objects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"frame_timestamp": 0.0, "objects": []}
            ])))
            .mount(&mock_server)
            .await;

        let (store, processor) = test_processor(mock_server.uri()).await;
        let video_id = VideoId::from_string("v1");

        processor.process(video_id.clone(), "data/videos/a.mp4".to_string()).await.unwrap();

        assert!(processor.get_progress(&video_id).is_none());

        let status: Vec<String> = store
            .execute_query("SELECT processing_status FROM videos WHERE video_id = 'v1'", &[], |row| row.get(0))
            .unwrap();
        assert_eq!(status, vec!["complete".to_string()]);
    }

    #[tokio::test]
    async fn extraction_failure_marks_video_error_and_clears_active_set() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract_frames"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let (store, processor) = test_processor(mock_server.uri()).await;
        let video_id = VideoId::from_string("v1");

        let result = processor.process(video_id.clone(), "data/videos/a.mp4".to_string()).await;
        assert!(result.is_err());
        assert!(processor.get_progress(&video_id).is_none());

        let status: Vec<String> = store
            .execute_query("SELECT processing_status FROM videos WHERE video_id = 'v1'", &[], |row| row.get(0))
            .unwrap();
        assert_eq!(status, vec!["error".to_string()]);
    }
}
