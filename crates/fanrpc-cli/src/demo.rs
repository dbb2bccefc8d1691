//! Demo services exposed by `fanrpc serve`.
//!
//! - `Echo.Echo`: returns its arguments unchanged
//! - `Arith.Sum`: `{"a": x, "b": y}` → `x + y`
//! - `Arith.Sleep`: `ms` or `{"ms": ms}` → sleeps, then returns `ms`

use std::time::Duration;

use fanrpc_common::protocol::error::{FanrpcError, Result};
use fanrpc_common::protocol::{Request, Response};
use fanrpc_common::transport::TcpServer;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Dispatches one request to the demo services.
///
/// Unknown or ill-formed methods produce a failed reply frame rather than an
/// error, so the connection stays usable.
pub async fn handle(request: Request) -> Result<Response> {
    debug!(method = %request.service_method, id = request.id, "Handling request");
    let outcome = dispatch(&request).await;
    Ok(Response::from_result(request.id, outcome))
}

async fn dispatch(request: &Request) -> Result<Value> {
    let Some((service, method)) = request.split_service_method() else {
        return Err(FanrpcError::InvalidRequest(format!(
            "rpc server: service/method request ill-formed: {}",
            request.service_method
        )));
    };

    match (service, method) {
        ("Echo", "Echo") => Ok(request.args.clone()),
        ("Arith", "Sum") => sum(&request.args),
        ("Arith", "Sleep") => {
            let ms = sleep_millis(&request.args)?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!(ms))
        }
        _ => Err(FanrpcError::InvalidRequest(format!(
            "rpc server: can't find method {}",
            request.service_method
        ))),
    }
}

fn sum(args: &Value) -> Result<Value> {
    let (a, b) = (&args["a"], &args["b"]);
    // integer sums that overflow fall through to floating point
    if let Some(sum) = a.as_i64().zip(b.as_i64()).and_then(|(a, b)| a.checked_add(b)) {
        return Ok(json!(sum));
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => Ok(json!(a + b)),
        _ => Err(FanrpcError::InvalidRequest(
            "Arith.Sum expects {\"a\": number, \"b\": number}".to_string(),
        )),
    }
}

fn sleep_millis(args: &Value) -> Result<u64> {
    args.as_u64()
        .or_else(|| args["ms"].as_u64())
        .ok_or_else(|| FanrpcError::InvalidRequest("Arith.Sleep expects a millisecond count".to_string()))
}

/// Serves the demo services on `bind` until `shutdown` is cancelled.
pub async fn serve(bind: &str, shutdown: CancellationToken) -> Result<()> {
    let server = TcpServer::new(bind).await?;
    info!(addr = %server.local_addr()?, "Demo server listening");
    server.run_until(handle, shutdown).await
}
