//! Shared HTTP request helpers for CLI commands.

use anyhow::{Context, Result, bail};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

async fn send(request: RequestBuilder, url: &str) -> Result<Response> {
    request
        .send()
        .await
        .with_context(|| format!("failed to connect to murmurd at {} — is it running?", url))
}

/// Decode a JSON body, turning error statuses into the daemon's message.
async fn parse<T: for<'de> Deserialize<'de>>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        bail!("murmurd returned {}: {}", status, message);
    }
    resp.json::<T>().await.context("failed to parse response")
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    parse(send(reqwest::Client::new().get(url), url).await?).await
}

/// Like [`get_json`], but a 404 is `None`.
pub async fn get_json_opt<T: for<'de> Deserialize<'de>>(url: &str) -> Result<Option<T>> {
    let resp = send(reqwest::Client::new().get(url), url).await?;
    if resp.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    parse(resp).await.map(Some)
}

pub async fn post_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    parse(send(reqwest::Client::new().post(url), url).await?).await
}

pub async fn post_json_body<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    parse(send(reqwest::Client::new().post(url).json(body), url).await?).await
}

pub async fn post_bytes<R: for<'de> Deserialize<'de>>(url: &str, body: Vec<u8>) -> Result<R> {
    let request = reqwest::Client::new()
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
        .body(body);
    parse(send(request, url).await?).await
}

pub async fn delete_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    parse(send(reqwest::Client::new().delete(url), url).await?).await
}
