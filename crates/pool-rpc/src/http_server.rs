//! HTTP JSON-RPC Server
//!
//! Provides HTTP endpoint for JSON-RPC methods.

use crate::methods::{
    handle_get_health, handle_get_pending_reward, handle_get_pool_balance, handle_get_pool_info,
    handle_get_slot, handle_get_total_fee_rate, handle_get_user_info,
    handle_get_user_reward_fee_rate, parse_pubkey, RpcContext, RpcError,
};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_program::pubkey::Pubkey;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// HTTP RPC Server
pub struct HttpRpcServer {
    context: Arc<RpcContext>,
}

impl HttpRpcServer {
    pub fn new(context: Arc<RpcContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/", post(handle_rpc))
            .layer(cors)
            .with_state(self.context)
    }

    /// Run the server until `shutdown` resolves
    pub async fn run(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(
            "{} HTTP RPC server listening on {}",
            self.context.chain.layer,
            addr
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Handle JSON-RPC request
async fn handle_rpc(
    State(context): State<Arc<RpcContext>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let response = match dispatch_method(&context, &request.method, request.params) {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(e) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: None,
            error: Some(JsonRpcError {
                code: e.code(),
                message: e.to_string(),
            }),
        },
    };

    (StatusCode::OK, Json(response))
}

/// Positional pubkey parameter `index`
fn pubkey_param(params: &[Value], index: usize, name: &str) -> Result<Pubkey, RpcError> {
    let value = params
        .get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::InvalidParams(format!("Missing {}", name)))?;
    parse_pubkey(value)
}

fn to_json<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::InternalError(e.to_string()))
}

/// Dispatch to appropriate method handler
pub fn dispatch_method(ctx: &RpcContext, method: &str, params: Value) -> Result<Value, RpcError> {
    tracing::debug!("RPC method called: {}", method);
    let params: Vec<Value> = serde_json::from_value(params).unwrap_or_default();

    match method {
        "getPoolInfo" => {
            let token = pubkey_param(&params, 0, "token")?;
            to_json(handle_get_pool_info(ctx, &token)?)
        }

        "getUserInfo" => {
            let token = pubkey_param(&params, 0, "token")?;
            let user = pubkey_param(&params, 1, "user")?;
            to_json(handle_get_user_info(ctx, &token, &user)?)
        }

        "getPendingReward" => {
            let token = pubkey_param(&params, 0, "token")?;
            let user = pubkey_param(&params, 1, "user")?;
            Ok(json!(handle_get_pending_reward(ctx, &token, &user)?))
        }

        "getPoolBalance" => {
            let token = pubkey_param(&params, 0, "token")?;
            Ok(json!(handle_get_pool_balance(ctx, &token)?))
        }

        "getTotalFeeRate" => Ok(json!(handle_get_total_fee_rate(ctx)?)),

        "getUserRewardFeeRate" => Ok(json!(handle_get_user_reward_fee_rate(ctx)?)),

        "getSlot" => Ok(json!(handle_get_slot(ctx)?)),

        "getHealth" => Ok(json!(handle_get_health()?)),

        "getVersion" => Ok(json!({
            "fastbridge-version": env!("CARGO_PKG_VERSION"),
            "layer": ctx.chain.layer.as_str(),
        })),

        _ => Err(RpcError::MethodNotFound(method.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::{FeeRates, Layer};
    use chain_runtime::ChainState;
    use pool_ledger::{InMemoryTokenLedger, LiquidityPool, PoolConfig};

    struct Fixture {
        ctx: RpcContext,
        token: Pubkey,
        user: Pubkey,
    }

    fn fixture() -> Fixture {
        let owner = Pubkey::new_unique();
        let tokens = Arc::new(InMemoryTokenLedger::new());
        let pool = LiquidityPool::new(
            PoolConfig {
                layer: Layer::L2,
                address: Pubkey::new_unique(),
                owner,
                messenger: Pubkey::new_unique(),
                peer_pool: Pubkey::new_unique(),
                fee_rates: FeeRates::default(),
            },
            tokens.clone(),
        )
        .unwrap();

        let token = Pubkey::new_unique();
        let user = Pubkey::new_unique();
        pool.register_pool(&owner, Pubkey::new_unique(), token, 4).unwrap();
        tokens.mint(&token, &user, 1_000_000_000_000_000_000_000).unwrap();
        pool.add_liquidity(&user, 1_000_000_000_000_000_000_000, &token)
            .unwrap();

        Fixture {
            ctx: RpcContext::new(ChainState::new(Layer::L2, Arc::new(pool), tokens)),
            token,
            user,
        }
    }

    #[test]
    fn test_pool_info_amounts_are_strings() {
        let f = fixture();
        let value = dispatch_method(&f.ctx, "getPoolInfo", json!([f.token.to_string()])).unwrap();

        assert_eq!(
            value["value"]["userDepositAmount"],
            json!("1000000000000000000000")
        );
        assert_eq!(value["value"]["startTime"], json!(4));
        assert_eq!(value["context"]["slot"], json!(0));
    }

    #[test]
    fn test_unknown_pool_is_null() {
        let f = fixture();
        let value = dispatch_method(
            &f.ctx,
            "getPoolInfo",
            json!([Pubkey::new_unique().to_string()]),
        )
        .unwrap();
        assert!(value["value"].is_null());
    }

    #[test]
    fn test_user_and_reward_queries() {
        let f = fixture();
        let params = json!([f.token.to_string(), f.user.to_string()]);

        let user = dispatch_method(&f.ctx, "getUserInfo", params.clone()).unwrap();
        assert_eq!(user["value"]["amount"], json!("1000000000000000000000"));

        let reward = dispatch_method(&f.ctx, "getPendingReward", params).unwrap();
        assert_eq!(reward, json!("0"));

        let balance =
            dispatch_method(&f.ctx, "getPoolBalance", json!([f.token.to_string()])).unwrap();
        assert_eq!(balance, json!("1000000000000000000000"));
    }

    #[test]
    fn test_fee_rates() {
        let f = fixture();
        assert_eq!(
            dispatch_method(&f.ctx, "getTotalFeeRate", Value::Null).unwrap(),
            json!(50)
        );
        assert_eq!(
            dispatch_method(&f.ctx, "getUserRewardFeeRate", Value::Null).unwrap(),
            json!(35)
        );
    }

    #[test]
    fn test_error_codes() {
        let f = fixture();

        let missing = dispatch_method(&f.ctx, "getPoolInfo", json!([])).unwrap_err();
        assert_eq!(missing.code(), -32602);

        let bad_key = dispatch_method(&f.ctx, "getPoolInfo", json!(["not-a-key"])).unwrap_err();
        assert_eq!(bad_key.code(), -32602);

        let unregistered = dispatch_method(
            &f.ctx,
            "getPendingReward",
            json!([Pubkey::new_unique().to_string(), f.user.to_string()]),
        )
        .unwrap_err();
        assert_eq!(unregistered.code(), -32602);

        let unknown = dispatch_method(&f.ctx, "sendTransaction", Value::Null).unwrap_err();
        assert_eq!(unknown.code(), -32601);
    }
}
