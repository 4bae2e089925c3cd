//! Common test utilities for gridview.
//!
//! This module provides shared utilities for testing the gridview server.

#![allow(dead_code)]

pub mod assertions;
pub mod http_client;
pub mod test_data;
