use std::{
    fs::File,
    io::{
        BufWriter,
        Write,
    },
    path::Path,
    time::Duration,
};

use reqwest::{
    blocking::{
        Client,
        RequestBuilder,
        Response,
    },
    header::USER_AGENT,
};

use crate::core::WordToAnkiError;

pub const MAX_ATTEMPTS: usize = 3;
const USER_AGENT_VALUE: &str = concat!("word-to-anki/", env!("CARGO_PKG_VERSION"), " (+reqwest)");

pub fn http_client(timeout: Duration) -> Result<Client, WordToAnkiError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| WordToAnkiError::Custom(format!("HTTP client build failed: {e}")))
}

/// Sends the request built by `build`, retrying connection-level failures with a linear
/// backoff. HTTP error statuses are returned to the caller untouched.
pub fn send_with_retry(
    build: impl Fn() -> RequestBuilder,
    backoff: Duration,
) -> Result<Response, reqwest::Error> {
    let mut attempts: usize = 0;
    loop {
        attempts += 1;

        match build().header(USER_AGENT, USER_AGENT_VALUE).send() {
            Ok(resp) => return Ok(resp),
            Err(e) if attempts < MAX_ATTEMPTS && (e.is_timeout() || e.is_connect()) => {
                log::warn!("[HTTP] attempt {} of {} failed: {}", attempts, MAX_ATTEMPTS, e);
                std::thread::sleep(backoff * attempts as u32);
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn download_to_file(
    client: &Client,
    url: &str,
    path: &Path,
    backoff: Duration,
) -> Result<u64, WordToAnkiError> {
    let mut attempts: usize = 0;
    loop {
        attempts += 1;

        let mut resp = send_with_retry(|| client.get(url), backoff)
            .map_err(|e| WordToAnkiError::DeviceUnreachable(format!("GET {}: {}", url, e)))?;

        ensure_success(&resp)
            .map_err(|e| WordToAnkiError::DeviceUnreachable(e.to_string()))?;

        let mut writer = BufWriter::new(File::create(path)?);

        match resp.copy_to(&mut writer) {
            Ok(n) if n > 0 => {
                writer.flush()?;
                return Ok(n);
            }
            Ok(_) | Err(_) => {
                if attempts < MAX_ATTEMPTS {
                    std::thread::sleep(backoff * attempts as u32);
                    continue;
                }
                return Err(WordToAnkiError::DeviceUnreachable(format!(
                    "Failed to copy response body from {} to {:?}",
                    url, path
                )));
            }
        }
    }
}

pub fn ensure_success(resp: &Response) -> Result<(), WordToAnkiError> {
    if !resp.status().is_success() {
        return Err(WordToAnkiError::Custom(format!(
            "HTTP error {} from {}",
            resp.status(),
            resp.url()
        )));
    }
    Ok(())
}
