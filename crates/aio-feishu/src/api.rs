use std::sync::Arc;

use aio_core::BridgeError;
use serde_json::Value;

use crate::auth::TokenStore;
use crate::backend::{ApiRequest, ApiResponse, HttpMethod, LarkBackend};
use crate::retry::RetryPolicy;

/// Authenticated access to the open API shared by the Feishu components.
pub(crate) struct FeishuApi {
    backend: Arc<dyn LarkBackend>,
    tokens: Arc<TokenStore>,
    retry: RetryPolicy,
}

impl FeishuApi {
    pub fn new(backend: Arc<dyn LarkBackend>, tokens: Arc<TokenStore>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            tokens,
            retry,
        }
    }

    pub(crate) fn check(response: &ApiResponse, ctx: &str) -> Result<(), BridgeError> {
        let code = response.body["code"].as_i64().unwrap_or(-1);
        if code != 0 {
            Err(BridgeError::remote(
                ctx,
                code,
                response.body["msg"].as_str().unwrap_or("unknown"),
            ))
        } else {
            Ok(())
        }
    }

    /// Issue `request` with a bearer token and return the `data` object of a
    /// successful response.
    ///
    /// GET requests are retried on transient failures; POSTs are sent once.
    pub async fn call(&self, request: ApiRequest, ctx: &str) -> Result<Value, BridgeError> {
        let token = self.tokens.get_token().await?;
        let request = request.with_bearer(token);
        let retry = match request.method {
            HttpMethod::Get => self.retry.clone(),
            HttpMethod::Post => RetryPolicy::none(),
        };
        let response = retry
            .run(ctx, || async {
                let response = self.backend.send(request.clone()).await?;
                if response.status >= 500 {
                    return Err(BridgeError::Transport(format!(
                        "{ctx}: HTTP {}",
                        response.status
                    )));
                }
                Ok(response)
            })
            .await?;
        Self::check(&response, ctx)?;
        Ok(response.body["data"].clone())
    }
}
