use anyhow::{anyhow, Result};

pub fn validate_storage_backend(value: &str) -> Result<()> {
    match value.trim().to_lowercase().as_str() {
        "clickhouse" | "memory" => Ok(()),
        other => Err(anyhow!(
            "unsupported storage_backend '{}', expected clickhouse or memory",
            other
        )),
    }
}

pub fn validate_webhook_url(value: &str) -> Result<()> {
    let trimmed = value.trim();
    let supported = ["http://", "https://", "ws://", "wss://"];
    if !supported.iter().any(|scheme| trimmed.starts_with(scheme)) {
        return Err(anyhow!(
            "visit_webhook_url must use http(s) or ws(s): '{}'",
            trimmed
        ));
    }
    Ok(())
}
