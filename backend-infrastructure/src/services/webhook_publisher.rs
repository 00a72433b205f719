use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use sha2::Sha256;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use backend_domain::ports::VisitPublisher;
use backend_domain::{RuntimeConfig, VisitEventKind};

pub const SIGNATURE_HEADER: &str = "X-Wayfarer-Signature";
pub const EVENT_HEADER: &str = "X-Wayfarer-Event";

type HmacSha256 = Hmac<Sha256>;

/// Delivers visit notifications to one external target: an HTTP endpoint
/// (JSON POST) or a WebSocket endpoint (one text frame per notification).
pub struct WebhookVisitPublisher {
    url: String,
    token: Option<String>,
    secret: Option<String>,
    request_timeout: Duration,
    client: Client,
}

impl WebhookVisitPublisher {
    pub fn new(
        url: String,
        token: Option<String>,
        secret: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            url,
            token,
            secret,
            request_timeout,
            client,
        })
    }

    /// `None` when no webhook is configured.
    pub fn from_config(config: &RuntimeConfig) -> Result<Option<Self>> {
        let Some(url) = config.visit_webhook_url.clone() else {
            return Ok(None);
        };
        Self::new(
            url,
            config.visit_webhook_token.clone(),
            config.visit_webhook_secret.clone(),
            Duration::from_secs(config.request_timeout_seconds.max(3)),
        )
        .map(Some)
    }

    fn is_ws(&self) -> bool {
        self.url.starts_with("ws://") || self.url.starts_with("wss://")
    }

    async fn send_http(&self, kind: VisitEventKind, body: String) -> Result<()> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(EVENT_HEADER, kind.as_str());
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign(secret, &body)?);
        }
        request.body(body).send().await?.error_for_status()?;
        Ok(())
    }

    async fn send_ws(&self, body: String) -> Result<()> {
        if let Err(err) = self.try_ws_send(&body, false).await {
            if self.token.is_none() {
                return Err(err);
            }
            self.try_ws_send(&body, true).await?;
        }
        Ok(())
    }

    async fn try_ws_send(&self, body: &str, use_query: bool) -> Result<()> {
        let token = self.token.as_deref();
        let mut request = if use_query {
            add_access_token_query(&self.url, token).into_client_request()?
        } else {
            self.url.as_str().into_client_request()?
        };
        if let Some(token) = token {
            if !use_query {
                request
                    .headers_mut()
                    .insert(AUTHORIZATION, format!("Bearer {}", token).parse()?);
            }
        }
        if let Some(secret) = &self.secret {
            request
                .headers_mut()
                .insert(SIGNATURE_HEADER, sign(secret, body)?.parse()?);
        }

        let (mut ws, _) = timeout(self.request_timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| anyhow!("websocket connect timed out"))??;
        ws.send(Message::Text(body.to_string())).await?;
        let _ = timeout(Duration::from_secs(2), ws.next()).await.ok();
        let _ = ws.close(None).await;
        Ok(())
    }
}

#[async_trait]
impl VisitPublisher for WebhookVisitPublisher {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn publish(
        &self,
        _user_id: &str,
        kind: VisitEventKind,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let body = payload.to_string();
        if self.is_ws() {
            self.send_ws(body).await
        } else {
            self.send_http(kind, body).await
        }
    }
}

/// `sha256=<hex>` HMAC of the exact request body.
pub fn sign(secret: &str, body: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| anyhow!("invalid webhook secret: {}", err))?;
    mac.update(body.as_bytes());
    let digest = mac.finalize().into_bytes();
    let hex = digest.iter().map(|b| format!("{:02x}", b)).collect::<String>();
    Ok(format!("sha256={}", hex))
}

fn add_access_token_query(url: &str, token: Option<&str>) -> String {
    let token = match token {
        Some(value) if !value.trim().is_empty() => value,
        _ => return url.to_string(),
    };
    if url.contains("access_token=") {
        return url.to_string();
    }
    if url.contains('?') {
        format!("{}&access_token={}", url, token)
    } else {
        format!("{}?access_token={}", url, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_known_vector() {
        // RFC 4231 test case 2
        let signature = sign("Jefe", "what do ya want for nothing?").expect("sign");
        assert_eq!(
            signature,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn access_token_query_appends_once() {
        assert_eq!(
            add_access_token_query("ws://hub/visits", Some("abc")),
            "ws://hub/visits?access_token=abc"
        );
        assert_eq!(
            add_access_token_query("ws://hub/visits?room=1", Some("abc")),
            "ws://hub/visits?room=1&access_token=abc"
        );
        assert_eq!(
            add_access_token_query("ws://hub/visits?access_token=x", Some("abc")),
            "ws://hub/visits?access_token=x"
        );
        assert_eq!(add_access_token_query("ws://hub", None), "ws://hub");
    }

    #[test]
    fn no_url_means_no_publisher() {
        let config = RuntimeConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            api_token: None,
            settings_path: "s.yaml".to_string(),
            places_path: "p.json".to_string(),
            settings_cache_seconds: 30,
            detection_timeout_seconds: 10,
            visit_history_limit: 10,
            location_buffer_limit: 10,
            visit_webhook_url: None,
            visit_webhook_token: None,
            visit_webhook_secret: None,
            max_body_bytes: 1024,
            request_timeout_seconds: 5,
        };
        assert!(WebhookVisitPublisher::from_config(&config)
            .expect("config")
            .is_none());
    }
}
