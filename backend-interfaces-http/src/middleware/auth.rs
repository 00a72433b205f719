use std::io::Read;

use anyhow::{anyhow, Result};
use axum::http::HeaderMap;
use flate2::read::GzDecoder;

use backend_domain::{PingEnvelope, PingPayload, RuntimeConfig};

pub fn authorize(config: &RuntimeConfig, headers: &HeaderMap) -> bool {
    if let Some(api_token) = &config.api_token {
        return extract_bearer(headers)
            .map(|v| v == *api_token)
            .unwrap_or(false);
    }
    true
}

/// Header first, then an `access_token` query value for clients that
/// cannot set headers on a WebSocket handshake.
pub fn authorize_with_query(
    config: &RuntimeConfig,
    headers: &HeaderMap,
    access_token: Option<&str>,
) -> bool {
    if authorize(config, headers) {
        return true;
    }
    match (&config.api_token, access_token) {
        (Some(expected), Some(given)) => given.trim() == expected,
        _ => false,
    }
}

pub fn parse_pings(headers: &HeaderMap, body: &[u8]) -> Result<PingEnvelope> {
    let content = maybe_gunzip(headers, body)?;
    let envelope: PingEnvelope = serde_json::from_str(&content)?;
    if envelope.schema_version.trim() != "v2" {
        return Err(anyhow!(
            "unsupported schema_version '{}', expected 'v2'",
            envelope.schema_version
        ));
    }
    Ok(envelope)
}

pub fn parse_check_in(headers: &HeaderMap, body: &[u8]) -> Result<PingPayload> {
    let content = maybe_gunzip(headers, body)?;
    Ok(serde_json::from_str(&content)?)
}

fn maybe_gunzip(headers: &HeaderMap, body: &[u8]) -> Result<String> {
    if let Some(encoding) = headers.get("Content-Encoding") {
        if encoding.to_str().unwrap_or("") == "gzip" {
            let mut decoder = GzDecoder::new(body);
            let mut out = String::new();
            decoder.read_to_string(&mut out)?;
            return Ok(out);
        }
    }
    Ok(String::from_utf8(body.to_vec())?)
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("Authorization")?.to_str().ok()?.trim();
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}
