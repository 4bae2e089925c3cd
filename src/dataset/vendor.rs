//! Authenticated opener for vendor-hosted Zarr stores.
//!
//! Some providers serve their stores only to registered users. The opener
//! sends the configured username in a request header, along with a user
//! agent, on every request to the store.

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use zarrs_object_store::object_store::ClientOptions;
use tracing::info;

use super::engine::is_url;
use super::zarr::ZarrDataset;
use super::DatasetHandle;
use crate::config::VendorConfig;
use crate::error::{Result, ViewerError};

#[derive(Debug, Clone)]
pub struct VendorOpener {
    username: Option<String>,
    username_header: String,
    user_agent: String,
}

impl VendorOpener {
    pub fn new(config: &VendorConfig) -> Self {
        Self {
            username: config.username.clone().filter(|u| !u.trim().is_empty()),
            username_header: config.username_header.clone(),
            user_agent: config.user_agent.clone(),
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Headers sent with every store request
    pub fn headers(&self) -> Result<HeaderMap> {
        let username = self.username.as_deref().ok_or_else(|| ViewerError::Config {
            message: "the vendor opener requires a registered username".to_string(),
        })?;

        let name = HeaderName::from_bytes(self.username_header.as_bytes()).map_err(|e| {
            ViewerError::Config {
                message: format!("Invalid vendor username header {}: {}", self.username_header, e),
            }
        })?;
        let value = HeaderValue::from_str(username).map_err(|e| ViewerError::Config {
            message: format!("Invalid vendor username: {}", e),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(name, value);
        Ok(headers)
    }

    /// Open `source` as a vendor-hosted Zarr store
    pub fn open(&self, source: &str) -> Result<DatasetHandle> {
        if !is_url(source) {
            return Err(ViewerError::Zarr {
                message: format!("vendor stores are only reachable over http(s), got {}", source),
            });
        }

        let agent = HeaderValue::from_str(&self.user_agent).map_err(|e| ViewerError::Config {
            message: format!("Invalid vendor user agent: {}", e),
        })?;
        let options = ClientOptions::new()
            .with_default_headers(self.headers()?)
            .with_user_agent(agent);

        info!(source = source, user_agent = %self.user_agent, "Opening vendor store");
        let dataset = ZarrDataset::open_remote(source, options, "vendor")?;
        Ok(Arc::new(dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(username: Option<&str>) -> VendorConfig {
        VendorConfig {
            username: username.map(str::to_string),
            ..VendorConfig::default()
        }
    }

    #[test]
    fn test_missing_username_is_rejected() {
        let opener = VendorOpener::new(&config(None));
        let err = opener.open("https://vendor.example/store.zarr").unwrap_err();
        assert!(err.to_string().contains("requires a registered username"));

        let blank = VendorOpener::new(&config(Some("  ")));
        assert_eq!(blank.username(), None);
    }

    #[test]
    fn test_username_header() {
        let opener = VendorOpener::new(&config(Some("analyst")));
        let headers = opener.headers().unwrap();
        let header = VendorConfig::default().username_header;
        assert_eq!(headers.get(header.as_str()).unwrap(), "analyst");
    }

    #[test]
    fn test_local_paths_are_not_vendor_stores() {
        let opener = VendorOpener::new(&config(Some("analyst")));
        assert!(opener.open("/data/local.zarr").is_err());
    }
}
