//! Request validation the HTTP surface applies before a request
//! reaches any component (SS6, SS8 boundary cases): `video_id`
//! character rejection, `video_path` extension whitelisting, and the
//! parameter-body size cap.

const FORBIDDEN_VIDEO_ID_CHARS: &[char] = &['.', '/', '\\', '<', '>', '|', '*', '?'];

const ALLOWED_VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".avi", ".mov", ".mkv", ".webm"];

/// Rejects `..`, path separators, and the shell/HTML metacharacters
/// SS8 names, plus any ASCII control character.
pub fn validate_video_id(video_id: &str) -> Result<(), String> {
    if video_id.is_empty() {
        return Err("video_id must not be empty".to_string());
    }
    if video_id.chars().any(|c| FORBIDDEN_VIDEO_ID_CHARS.contains(&c) || c.is_control()) {
        return Err("video_id contains path-traversal or control characters".to_string());
    }
    Ok(())
}

/// SS6 progressive endpoint: only recognized video extensions, no `..`
/// sequences anywhere in the path.
pub fn validate_video_path(video_path: &str) -> Result<(), String> {
    if video_path.contains("..") {
        return Err("video_path must not contain '..'".to_string());
    }
    let lower = video_path.to_ascii_lowercase();
    if !ALLOWED_VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Err(format!(
            "video_path must end with one of {ALLOWED_VIDEO_EXTENSIONS:?}"
        ));
    }
    Ok(())
}

/// SS6: parameters are capped at 1 MB independent of the overall 10 MB
/// body limit enforced by the tower-http layer.
pub fn validate_parameters_size(parameters: &serde_json::Value, max_bytes: usize) -> Result<(), String> {
    let size = serde_json::to_vec(parameters).map(|v| v.len()).unwrap_or(usize::MAX);
    if size > max_bytes {
        return Err(format!("parameters exceed the {max_bytes}-byte limit"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_traversal_in_video_id() {
        assert!(validate_video_id("../etc/passwd").is_err());
        assert!(validate_video_id("v<script>").is_err());
        assert!(validate_video_id("v1").is_ok());
    }

    #[test]
    fn accepts_only_recognized_video_extensions() {
        assert!(validate_video_path("data/videos/a.mp4").is_ok());
        assert!(validate_video_path("data/videos/a.exe").is_err());
        assert!(validate_video_path("data/../etc/a.mp4").is_err());
    }

    #[test]
    fn rejects_oversized_parameters() {
        let big = serde_json::json!({ "blob": "x".repeat(100) });
        assert!(validate_parameters_size(&big, 10).is_err());
        assert!(validate_parameters_size(&big, 10_000).is_ok());
    }
}
