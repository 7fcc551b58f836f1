//! HTTP Client Factory
//!
//! Builds the reqwest client shared by planner requests.

use super::types::{LlmError, LlmResult};

/// Build a `reqwest::Client` with the configured proxy.
///
/// - `Some(url)` -> route every request through the proxy
/// - `None` -> explicitly disable proxy (`no_proxy`), ignoring env vars
///
/// Request timeouts are enforced per call by the planner client, not here.
pub fn build_http_client(proxy: Option<&str>) -> LlmResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    match proxy {
        Some(url) => {
            let p = reqwest::Proxy::all(url).map_err(|e| LlmError::InvalidRequest {
                message: format!("invalid proxy URL {}: {}", url, e),
            })?;
            builder = builder.proxy(p);
        }
        None => {
            builder = builder.no_proxy();
        }
    }
    builder.build().map_err(|e| LlmError::Other {
        message: format!("failed to build HTTP client: {}", e),
    })
}
