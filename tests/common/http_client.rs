//! HTTP client utilities for testing.
//!
//! Helpers for making requests to the gridview server during tests.

use reqwest::{Client, Response, StatusCode, Url};
use serde::Serialize;
use std::error::Error;
use std::net::SocketAddr;
use std::time::Duration;

/// Default timeout for HTTP requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a default test client
pub fn create_test_client() -> Client {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .expect("Failed to build test HTTP client")
}

/// Build a URL for a gridview server endpoint
pub fn build_url(addr: &SocketAddr, path: &str) -> Url {
    format!("http://{}{}", addr, path)
        .parse()
        .expect("Failed to parse URL")
}

/// Make a GET request to the gridview server
pub async fn get(addr: &SocketAddr, path: &str) -> Result<Response, Box<dyn Error>> {
    Ok(create_test_client().get(build_url(addr, path)).send().await?)
}

/// Make a POST request without a body
pub async fn post(addr: &SocketAddr, path: &str) -> Result<Response, Box<dyn Error>> {
    Ok(create_test_client().post(build_url(addr, path)).send().await?)
}

/// Make a PUT request with a JSON body
pub async fn put_json<B: Serialize>(
    addr: &SocketAddr,
    path: &str,
    body: &B,
) -> Result<Response, Box<dyn Error>> {
    Ok(create_test_client()
        .put(build_url(addr, path))
        .json(body)
        .send()
        .await?)
}

/// Make a DELETE request
pub async fn delete(addr: &SocketAddr, path: &str) -> Result<Response, Box<dyn Error>> {
    Ok(create_test_client().delete(build_url(addr, path)).send().await?)
}

/// Status and JSON body of a response
pub async fn status_and_json(response: Response) -> Result<(StatusCode, serde_json::Value), Box<dyn Error>> {
    let status = response.status();
    let text = response.text().await?;
    let json = serde_json::from_str(&text).map_err(|e| format!("invalid JSON ({}): {}", e, text))?;
    Ok((status, json))
}

/// GET and parse the JSON body, whatever the status
pub async fn get_json(addr: &SocketAddr, path: &str) -> Result<(StatusCode, serde_json::Value), Box<dyn Error>> {
    status_and_json(get(addr, path).await?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let addr: SocketAddr = ([127, 0, 0, 1], 8050).into();
        let url = build_url(&addr, "/variables/sst/checklist");
        assert_eq!(url.as_str(), "http://127.0.0.1:8050/variables/sst/checklist");
    }
}
