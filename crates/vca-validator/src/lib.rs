//! Pure schema/range/ordering/referential validation for analysis
//! payloads (SS4.2). No I/O dependency beyond `serde_json`; referential
//! existence checks are the caller's responsibility to supply via
//! `known_video_ids`.

use thiserror::Error;
use vca_models::{CaptionPayload, ContextPayload, DetectedObject, FramePayload, ObjectDetectionPayload, TranscriptPayload};

pub type ValidationResult<T> = Result<T, ValidationError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: {reason}")]
    Field { field: String, reason: String },
    #[error("timestamps for context_type must be non-decreasing (index {index})")]
    OutOfOrder { index: usize },
    #[error("unknown video_id: {0}")]
    UnknownVideo(String),
}

impl ValidationError {
    fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Field {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub fn validate_frame(frame: &FramePayload, video_duration_seconds: Option<f64>) -> ValidationResult<()> {
    if frame.timestamp < 0.0 {
        return Err(ValidationError::field("timestamp", "must be >= 0"));
    }
    if let Some(duration) = video_duration_seconds {
        if frame.timestamp > duration + 0.01 {
            return Err(ValidationError::field(
                "timestamp",
                "frame timestamp exceeds video duration",
            ));
        }
    }
    Ok(())
}

pub fn validate_caption(caption: &CaptionPayload) -> ValidationResult<()> {
    if caption.text.trim().is_empty() {
        return Err(ValidationError::field("text", "Caption text cannot be empty"));
    }
    if let Some(confidence) = caption.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::field("confidence", "must be within [0,1]"));
        }
    }
    if caption.frame_timestamp < 0.0 {
        return Err(ValidationError::field("frame_timestamp", "must be >= 0"));
    }
    Ok(())
}

pub fn validate_transcript(segment: &TranscriptPayload) -> ValidationResult<()> {
    if segment.text.trim().is_empty() {
        return Err(ValidationError::field("text", "transcript text cannot be empty"));
    }
    if segment.end <= segment.start {
        return Err(ValidationError::field("end", "end must be greater than start"));
    }
    if let Some(confidence) = segment.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::field("confidence", "must be within [0,1]"));
        }
    }
    Ok(())
}

fn validate_detected_object(obj: &DetectedObject) -> ValidationResult<()> {
    if obj.class_name.trim().is_empty() {
        return Err(ValidationError::field("class_name", "cannot be empty"));
    }
    if !(0.0..=1.0).contains(&obj.confidence) {
        return Err(ValidationError::field("confidence", "must be within [0,1]"));
    }
    if let Some(bbox) = obj.bbox {
        if bbox.iter().any(|v| *v < 0.0) {
            return Err(ValidationError::field("bbox", "all elements must be non-negative"));
        }
    }
    Ok(())
}

pub fn validate_object_detection(detection: &ObjectDetectionPayload) -> ValidationResult<()> {
    if detection.frame_timestamp < 0.0 {
        return Err(ValidationError::field("frame_timestamp", "must be >= 0"));
    }
    for obj in &detection.objects {
        validate_detected_object(obj)?;
    }
    Ok(())
}

fn validate_one(payload: &ContextPayload, video_duration_seconds: Option<f64>) -> ValidationResult<()> {
    match payload {
        ContextPayload::Frame(f) => validate_frame(f, video_duration_seconds),
        ContextPayload::Caption(c) => validate_caption(c),
        ContextPayload::Transcript(t) => validate_transcript(t),
        ContextPayload::Object(o) => validate_object_detection(o),
        ContextPayload::Idempotency(_) => Ok(()),
    }
}

/// Validates an entire batch of payloads of (expected to be) the same
/// `context_type`: per-record checks plus the ordering invariant
/// (SS8 property 2). Referential existence against `known_video_ids`
/// is checked only when the caller supplies a non-empty set — an empty
/// set means "the caller didn't ask for a referential check", not
/// "no video exists".
pub fn validate_batch(
    payloads: &[ContextPayload],
    video_id: Option<&str>,
    known_video_ids: &[&str],
    video_duration_seconds: Option<f64>,
) -> ValidationResult<()> {
    if let Some(video_id) = video_id {
        if !known_video_ids.is_empty() && !known_video_ids.contains(&video_id) {
            return Err(ValidationError::UnknownVideo(video_id.to_string()));
        }
    }

    let mut last_timestamp: Option<f64> = None;
    for (index, payload) in payloads.iter().enumerate() {
        validate_one(payload, video_duration_seconds)?;

        if let Some(ts) = payload.primary_timestamp() {
            if let Some(last) = last_timestamp {
                if ts < last {
                    return Err(ValidationError::OutOfOrder { index });
                }
            }
            last_timestamp = Some(ts);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caption(text: &str, ts: f64) -> ContextPayload {
        ContextPayload::Caption(CaptionPayload {
            frame_timestamp: ts,
            text: text.to_string(),
            confidence: Some(0.8),
            model_version: None,
        })
    }

    #[test]
    fn rejects_empty_caption_text() {
        let err = validate_caption(&CaptionPayload {
            frame_timestamp: 1.0,
            text: "   ".into(),
            confidence: None,
            model_version: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("Caption text cannot be empty"));
    }

    #[test]
    fn rejects_transcript_with_zero_duration() {
        let err = validate_transcript(&TranscriptPayload {
            start: 1.0,
            end: 1.0,
            text: "hi".into(),
            confidence: None,
            language: None,
        })
        .unwrap_err();
        assert!(matches!(err, ValidationError::Field { .. }));
    }

    #[test]
    fn rejects_bbox_with_negative_component() {
        let err = validate_detected_object(&DetectedObject {
            class_name: "person".into(),
            confidence: 0.5,
            bbox: Some([0.0, -1.0, 10.0, 10.0]),
            track_id: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("bbox"));
    }

    #[test]
    fn batch_rejects_out_of_order_timestamps() {
        let batch = vec![caption("a", 2.0), caption("b", 1.0)];
        let err = validate_batch(&batch, None, &[], None).unwrap_err();
        assert_eq!(err, ValidationError::OutOfOrder { index: 1 });
    }

    #[test]
    fn batch_accepts_non_decreasing_timestamps_with_duplicates() {
        let batch = vec![caption("a", 1.0), caption("b", 1.0), caption("c", 2.0)];
        assert!(validate_batch(&batch, None, &[], None).is_ok());
    }

    #[test]
    fn batch_rejects_unknown_video() {
        let batch = vec![caption("a", 1.0)];
        let err = validate_batch(&batch, Some("missing"), &["v1", "v2"], None).unwrap_err();
        assert_eq!(err, ValidationError::UnknownVideo("missing".to_string()));
    }
}
