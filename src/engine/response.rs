//! Interpretation of inference service responses.
//!
//! Kept free of I/O so status/body combinations can be tested directly.

use super::GeneratedImage;
use crate::error::RequestError;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CaptionBody {
    result: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedUrlBody {
    #[serde(alias = "image_url")]
    url: String,
}

/// Message for a non-success response: the body text when present, else the reason phrase.
///
/// JSON error bodies in the `{"detail": ...}` or `{"error": ..., "detail": ...}` shape
/// are reduced to their text.
pub(crate) fn remote_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| status.as_str().to_string());
    }

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        let error = map.get("error").and_then(|v| v.as_str());
        let detail = map.get("detail").and_then(|v| v.as_str());
        match (error, detail) {
            (Some(e), Some(d)) => return format!("{e}: {d}"),
            (Some(m), None) | (None, Some(m)) => return m.to_string(),
            (None, None) => {}
        }
    }

    body.to_string()
}

pub(crate) fn caption_from_response(status: StatusCode, body: &str) -> Result<String, RequestError> {
    if !status.is_success() {
        return Err(RequestError::Remote {
            status: status.as_u16(),
            message: remote_message(status, body),
        });
    }
    serde_json::from_str::<CaptionBody>(body)
        .map(|b| b.result)
        .map_err(|e| RequestError::Malformed(format!("expected a JSON `result` field: {e}")))
}

pub(crate) fn generated_from_response(
    status: StatusCode,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<GeneratedImage, RequestError> {
    if !status.is_success() {
        return Err(RequestError::Remote {
            status: status.as_u16(),
            message: remote_message(status, &String::from_utf8_lossy(&body)),
        });
    }

    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());
    if let Some(mime) = mime.filter(|m| m.starts_with("image/")) {
        if body.is_empty() {
            return Err(RequestError::Malformed("empty image body".into()));
        }
        return Ok(GeneratedImage::Bytes { mime, data: body });
    }

    serde_json::from_slice::<GeneratedUrlBody>(&body)
        .map(|b| GeneratedImage::Url(b.url))
        .map_err(|e| {
            RequestError::Malformed(format!("expected image bytes or a JSON `url` field: {e}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_success_returns_result_field() {
        let caption =
            caption_from_response(StatusCode::OK, r#"{"result": "a dog on a beach"}"#).unwrap();
        assert_eq!(caption, "a dog on a beach");
    }

    #[test]
    fn caption_failure_uses_body_text() {
        let err =
            caption_from_response(StatusCode::INTERNAL_SERVER_ERROR, "model overloaded").unwrap_err();
        assert_eq!(
            err,
            RequestError::Remote {
                status: 500,
                message: "model overloaded".into()
            }
        );
    }

    #[test]
    fn empty_error_body_falls_back_to_reason_phrase() {
        assert_eq!(
            remote_message(StatusCode::SERVICE_UNAVAILABLE, "  \n"),
            "Service Unavailable"
        );
    }

    #[test]
    fn json_error_bodies_are_reduced_to_text() {
        assert_eq!(
            remote_message(StatusCode::BAD_REQUEST, r#"{"detail": "No prompt provided"}"#),
            "No prompt provided"
        );
        assert_eq!(
            remote_message(
                StatusCode::BAD_GATEWAY,
                r#"{"error": "OpenAI generation error", "detail": "quota"}"#
            ),
            "OpenAI generation error: quota"
        );
    }

    #[test]
    fn caption_without_result_field_is_malformed() {
        let err = caption_from_response(StatusCode::OK, r#"{"caption": "x"}"#).unwrap_err();
        assert!(matches!(err, RequestError::Malformed(_)));
    }

    #[test]
    fn generated_image_bytes_are_kept_with_mime() {
        let out = generated_from_response(
            StatusCode::OK,
            Some("image/jpeg"),
            Bytes::from_static(b"\xff\xd8\xff"),
        )
        .unwrap();
        assert_eq!(
            out,
            GeneratedImage::Bytes {
                mime: "image/jpeg".into(),
                data: Bytes::from_static(b"\xff\xd8\xff"),
            }
        );
    }

    #[test]
    fn generated_url_accepts_either_field_name() {
        let out = generated_from_response(
            StatusCode::OK,
            Some("application/json"),
            Bytes::from_static(br#"{"image_url": "https://img.example/1.png"}"#),
        )
        .unwrap();
        assert_eq!(out, GeneratedImage::Url("https://img.example/1.png".into()));
    }
}
