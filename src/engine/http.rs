use super::response::{caption_from_response, generated_from_response};
use super::{GeneratedImage, InferenceClient};
use crate::error::RequestError;
use crate::model::WorkflowConfig;
use crate::preview::SelectedFile;
use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::Serialize;

#[derive(Serialize)]
struct PromptBody<'a> {
    prompt: &'a str,
}

/// `reqwest`-backed client for the captioning and generation endpoints.
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    http: reqwest::Client,
    caption_url: reqwest::Url,
    generate_url: reqwest::Url,
    upload_field: String,
}

impl HttpInferenceClient {
    pub fn new(cfg: &WorkflowConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(cfg.user_agent.clone());
        if let Some(timeout) = cfg.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("build HTTP client")?;

        let caption_url = reqwest::Url::parse(&cfg.caption_url())
            .with_context(|| format!("invalid caption endpoint {}", cfg.caption_url()))?;
        let generate_url = reqwest::Url::parse(&cfg.generate_url())
            .with_context(|| format!("invalid generation endpoint {}", cfg.generate_url()))?;

        Ok(Self {
            http,
            caption_url,
            generate_url,
            upload_field: cfg.upload_field.clone(),
        })
    }
}

impl InferenceClient for HttpInferenceClient {
    async fn caption(&self, file: SelectedFile) -> Result<String, RequestError> {
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.mime)?;
        let form = Form::new().part(self.upload_field.clone(), part);

        tracing::debug!(url = %self.caption_url, file = %file.name, bytes = file.bytes.len(), "posting caption request");
        let resp = self
            .http
            .post(self.caption_url.clone())
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        tracing::debug!(%status, "caption response");

        caption_from_response(status, &body)
    }

    async fn generate(&self, prompt: String) -> Result<GeneratedImage, RequestError> {
        tracing::debug!(url = %self.generate_url, prompt_len = prompt.len(), "posting generation request");
        let resp = self
            .http
            .post(self.generate_url.clone())
            .json(&PromptBody { prompt: &prompt })
            .send()
            .await?;
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await?;
        tracing::debug!(%status, content_type = ?content_type, bytes = body.len(), "generation response");

        generated_from_response(status, content_type.as_deref(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageOutput;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request it received.
    async fn serve_once(
        status_line: &'static str,
        content_type: &'static str,
        body: &'static [u8],
    ) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = Vec::new();
            let mut buf = [0u8; 4096];
            let header_end = loop {
                let n = sock.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                req.extend_from_slice(&buf[..n]);
                if let Some(pos) = req.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let headers = String::from_utf8_lossy(&req[..header_end]).to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while req.len() < header_end + content_length {
                let n = sock.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                req.extend_from_slice(&buf[..n]);
            }

            let head = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            sock.write_all(head.as_bytes()).await.unwrap();
            sock.write_all(body).await.unwrap();
            sock.shutdown().await.ok();
            req
        });
        (format!("http://{addr}"), handle)
    }

    fn config(base_url: String) -> WorkflowConfig {
        WorkflowConfig {
            base_url,
            caption_path: "/predict".into(),
            generate_path: "/generate-image".into(),
            upload_field: "file".into(),
            request_timeout: None,
            output: ImageOutput::Inline,
            user_agent: "imagecap-test".into(),
        }
    }

    #[tokio::test]
    async fn caption_posts_multipart_and_reads_result() {
        let (base, server) =
            serve_once("200 OK", "application/json", br#"{"result":"a dog on a beach"}"#).await;
        let client = HttpInferenceClient::new(&config(base)).unwrap();
        let file = SelectedFile::from_bytes("dog.jpg", "image/jpeg", Bytes::from_static(b"JPEGDATA"));

        let caption = client.caption(file).await.unwrap();
        assert_eq!(caption, "a dog on a beach");

        let raw = String::from_utf8_lossy(&server.await.unwrap()).into_owned();
        assert!(raw.starts_with("POST /predict "));
        assert!(raw.contains("multipart/form-data"));
        assert!(raw.contains("name=\"file\""));
        assert!(raw.contains("filename=\"dog.jpg\""));
        assert!(raw.contains("JPEGDATA"));
    }

    #[tokio::test]
    async fn caption_server_error_carries_body_text() {
        let (base, server) =
            serve_once("500 Internal Server Error", "text/plain", b"model overloaded").await;
        let client = HttpInferenceClient::new(&config(base)).unwrap();
        let file = SelectedFile::from_bytes("dog.jpg", "image/jpeg", Bytes::from_static(b"x"));

        let err = client.caption(file).await.unwrap_err();
        assert_eq!(
            err,
            RequestError::Remote {
                status: 500,
                message: "model overloaded".into()
            }
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn generate_sends_prompt_json_and_returns_bytes() {
        let (base, server) = serve_once("200 OK", "image/jpeg", b"\xff\xd8\xffJPEG").await;
        let client = HttpInferenceClient::new(&config(base)).unwrap();

        let out = client.generate("a red kite".into()).await.unwrap();
        match out {
            GeneratedImage::Bytes { mime, data } => {
                assert_eq!(mime, "image/jpeg");
                assert_eq!(&data[..], b"\xff\xd8\xffJPEG");
            }
            other => panic!("unexpected {other:?}"),
        }

        let raw = String::from_utf8_lossy(&server.await.unwrap()).into_owned();
        assert!(raw.starts_with("POST /generate-image "));
        assert!(raw.contains(r#"{"prompt":"a red kite"}"#));
    }

    #[tokio::test]
    async fn expired_timeout_is_a_transport_error() {
        // Accepts the connection and never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            drop(sock);
        });

        let mut cfg = config(format!("http://{addr}"));
        cfg.request_timeout = Some(std::time::Duration::from_millis(200));
        let client = HttpInferenceClient::new(&cfg).unwrap();

        let err = client.generate("slow".into()).await.unwrap_err();
        server.abort();
        match err {
            RequestError::Transport(m) => assert!(m.starts_with("request timed out"), "{m}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = HttpInferenceClient::new(&config(format!("http://{addr}"))).unwrap();

        let err = client.generate("anything".into()).await.unwrap_err();
        assert!(matches!(err, RequestError::Transport(_)));
    }
}
