//! Delivery of payloads to sink endpoints.

use std::time::Duration;

#[cfg(feature = "metrics")]
use std::time::Instant;

use {
    async_trait::async_trait,
    reqwest::{
        Client,
        multipart::{Form, Part},
    },
    secrecy::ExposeSecret,
    tracing::debug,
};

#[cfg(feature = "metrics")]
use ferry_metrics::{counter, dispatch as dispatch_metrics, histogram, labels};

use crate::{
    error::{Error, Result},
    mapping::SinkTarget,
    transform::{FilePart, RelayPayload},
};

const OCTET_STREAM: &str = "application/octet-stream";

/// Delivers one payload to one target.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, target: &SinkTarget, payload: &RelayPayload) -> Result<()>;
}

/// Posts payloads to webhook URLs over HTTP.
///
/// JSON when the payload carries no files, multipart otherwise. By default
/// each call makes exactly one attempt; `retries` adds attempts separated by
/// a fixed delay.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: Client,
    retries: u32,
    retry_delay: Duration,
}

impl WebhookDispatcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            retries: 0,
            retry_delay: Duration::ZERO,
        })
    }

    #[must_use]
    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    pub fn from_config(config: &ferry_config::RelayConfig) -> Result<Self> {
        Ok(Self::new(Duration::from_secs(config.dispatch_timeout_secs))?.with_retries(
            config.dispatch_retries,
            Duration::from_millis(config.retry_delay_ms),
        ))
    }

    async fn send_once(&self, target: &SinkTarget, payload: &RelayPayload) -> Result<()> {
        let body = payload.body_for(target);
        let request = self.client.post(target.endpoint_url.expose_secret());
        let request = match payload {
            RelayPayload::Plain(_) => request.json(&body),
            RelayPayload::WithFiles(_, files) => {
                let json = serde_json::to_string(&body)?;
                let payload_json = Part::text(json).mime_str("application/json")?;
                let mut form = Form::new().part("payload_json", payload_json);
                for (index, file) in files.iter().enumerate() {
                    form = form.part(format!("files[{index}]"), file_part(file)?);
                }
                request.multipart(form)
            },
        };

        // Webhook URLs embed their token; keep it out of error messages.
        let response = request.send().await.map_err(reqwest::Error::without_url)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Binary part carrying the source content type, or a generic one when the
/// source gave none or an unparseable one.
fn file_part(file: &FilePart) -> Result<Part> {
    let part = || Part::bytes(file.bytes.to_vec()).file_name(file.filename.clone());
    let content_type = file.content_type.as_deref().unwrap_or(OCTET_STREAM);
    match part().mime_str(content_type) {
        Ok(p) => Ok(p),
        Err(_) => Ok(part().mime_str(OCTET_STREAM)?),
    }
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    async fn dispatch(&self, target: &SinkTarget, payload: &RelayPayload) -> Result<()> {
        #[cfg(feature = "metrics")]
        let started = Instant::now();

        let mut attempt = 0;
        let result = loop {
            #[cfg(feature = "metrics")]
            counter!(
                dispatch_metrics::DISPATCHES_TOTAL,
                labels::ENCODING => payload.encoding()
            )
            .increment(1);

            match self.send_once(target, payload).await {
                Ok(()) => break Ok(()),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    debug!(
                        target = %target.display_name,
                        endpoint = %target.redacted_endpoint(),
                        attempt,
                        error = %e,
                        "dispatch failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                },
                Err(e) => break Err(e),
            }
        };

        #[cfg(feature = "metrics")]
        {
            histogram!(dispatch_metrics::DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
            if result.is_err() {
                counter!(dispatch_metrics::FAILURES_TOTAL).increment(1);
            }
        }

        result
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::transform::{AttachmentManifest, WebhookBody},
        bytes::Bytes,
        wiremock::{
            Mock, MockServer, ResponseTemplate,
            matchers::{body_json, header_regex, method, path},
        },
    };

    fn target(server: &MockServer) -> SinkTarget {
        SinkTarget::new(
            format!("{}/api/webhooks/1/token", server.uri()),
            "Mirror",
            "https://cdn.example/a.png",
        )
    }

    fn dispatcher() -> WebhookDispatcher {
        WebhookDispatcher::new(Duration::from_secs(5)).unwrap()
    }

    fn text_payload(text: &str) -> RelayPayload {
        RelayPayload::Plain(WebhookBody {
            content: Some(text.into()),
            ..WebhookBody::default()
        })
    }

    #[tokio::test]
    async fn plain_payload_is_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/webhooks/1/token"))
            .and(header_regex("content-type", "^application/json"))
            .and(body_json(serde_json::json!({
                "content": "hello",
                "username": "Mirror",
                "avatar_url": "https://cdn.example/a.png",
                "allowed_mentions": {"parse": []}
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        dispatcher()
            .dispatch(&target(&server), &text_payload("hello"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn files_are_sent_as_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/webhooks/1/token"))
            .and(header_regex("content-type", "^multipart/form-data; boundary="))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let payload = RelayPayload::WithFiles(
            WebhookBody {
                attachments: vec![
                    AttachmentManifest {
                        id: 0,
                        filename: "cat.png".into(),
                    },
                    AttachmentManifest {
                        id: 1,
                        filename: "raw.bmp".into(),
                    },
                ],
                ..WebhookBody::default()
            },
            vec![
                FilePart {
                    source_index: 0,
                    filename: "cat.png".into(),
                    content_type: Some("image/png".into()),
                    bytes: Bytes::from_static(b"PNGDATA"),
                },
                FilePart {
                    source_index: 1,
                    filename: "raw.bmp".into(),
                    content_type: None,
                    bytes: Bytes::from_static(b"BMPDATA"),
                },
            ],
        );
        dispatcher()
            .dispatch(&target(&server), &payload)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body).to_string();
        let lower = body.to_ascii_lowercase();
        assert!(body.contains("name=\"payload_json\""));
        assert!(body.contains("\"attachments\":[{\"id\":0,\"filename\":\"cat.png\"}"));
        assert!(!body.contains("\"content\""));
        assert!(body.contains("name=\"files[0]\""));
        assert!(body.contains("filename=\"cat.png\""));
        assert!(lower.contains("content-type: image/png"));
        assert!(body.contains("name=\"files[1]\""));
        assert!(lower.contains("content-type: application/octet-stream"));
        assert!(body.contains("PNGDATA"));
    }

    #[tokio::test]
    async fn error_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("{\"message\": \"bad\"}"))
            .expect(1)
            .mount(&server)
            .await;

        let err = dispatcher()
            .dispatch(&target(&server), &text_payload("x"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::Status { status: 400, ref body } if body.contains("bad")),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        assert!(
            dispatcher()
                .dispatch(&target(&server), &text_payload("x"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn retries_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        dispatcher()
            .with_retries(2, Duration::from_millis(1))
            .dispatch(&target(&server), &text_payload("x"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn hanging_target_times_out_without_leaking_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;
        let target = SinkTarget::new(
            format!("{}/api/webhooks/1/hush-hush-token", server.uri()),
            "Mirror",
            "https://cdn.example/a.png",
        );

        let started = tokio::time::Instant::now();
        let err = WebhookDispatcher::new(Duration::from_millis(300))
            .unwrap()
            .dispatch(&target, &text_payload("x"))
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err, Error::Http(_)), "unexpected error: {err}");
        assert!(!err.to_string().contains("hush-hush-token"));
        assert!(!format!("{err:?}").contains("hush-hush-token"));
    }

    #[test]
    fn unparseable_content_type_falls_back() {
        let part = file_part(&FilePart {
            source_index: 0,
            filename: "x.png".into(),
            content_type: Some("not a mime".into()),
            bytes: Bytes::from_static(b"x"),
        });
        assert!(part.is_ok());
    }
}
