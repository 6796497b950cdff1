//! The JSON-RPC surface a browser dApp calls. One health method confirming
//! the service is up, plus thin wrappers over the client facade.

use std::net::Ipv4Addr;

use alloy::primitives::Address;
use anyhow::Result;
use http::{header, Method};
use jsonrpsee::{
    core::RpcResult,
    server::{ServerBuilder, ServerHandle},
    types::{error::ErrorCode, ErrorObject, ErrorObjectOwned},
    RpcModule,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::facade::AppClient;

pub fn rpc_module(client: AppClient) -> RpcModule<AppClient> {
    let mut module = RpcModule::new(client);

    module
        .register_method("surety_health", |_params, _client, _| {
            json!({ "message": "An API for use with your Dapp!" })
        })
        .unwrap();

    module
        .register_async_method("surety_isOperational", |_params, client, _| async move {
            let operational = client.is_operational().await.map_err(internal_error)?;
            RpcResult::Ok(Value::Bool(operational))
        })
        .unwrap();

    module
        .register_async_method("surety_credit", |params, client, _| async move {
            let (passenger,): (Address,) = params.parse()?;
            let credit = client.credit_of(passenger).await.map_err(internal_error)?;
            RpcResult::Ok(json!({ "passenger": passenger, "credit": credit.to_string() }))
        })
        .unwrap();

    module
        .register_async_method("surety_flightStatus", |params, client, _| async move {
            let (flight, timestamp, airline): (String, u64, Address) = params.parse()?;
            let result = client
                .flight_status(&flight, timestamp, airline)
                .await
                .map_err(internal_error)?;
            RpcResult::Ok(json!({
                "flight": result.flight,
                "timestamp": result.timestamp,
                "status": result.status.code(),
                "description": result.status.to_string(),
            }))
        })
        .unwrap();

    module
}

/// Starts the API server. The CORS layer is what lets a browser dApp call
/// it directly.
pub async fn launch(client: AppClient, port: u16) -> Result<ServerHandle> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers([header::CONTENT_TYPE]);
    let middleware = tower::ServiceBuilder::new().layer(cors);
    let server = ServerBuilder::new()
        .set_http_middleware(middleware)
        .build((Ipv4Addr::UNSPECIFIED, port))
        .await?;
    info!(port, "API server listening");
    Ok(server.start(rpc_module(client)))
}

fn internal_error(error: impl std::fmt::Display) -> ErrorObjectOwned {
    ErrorObject::owned(
        ErrorCode::InternalError.code(),
        error.to_string(),
        None::<String>,
    )
}
