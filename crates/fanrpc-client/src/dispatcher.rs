//! Discovery-aware call dispatch
//!
//! [`Dispatcher`] ties a [`Discovery`] to a [`ConnectionPool`]:
//!
//! - [`call`](Dispatcher::call) asks discovery for one endpoint and sends the
//!   call over its cached connection
//! - [`broadcast`](Dispatcher::broadcast) sends the call to every endpoint
//!   concurrently and keeps one successful reply
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fanrpc_client::{DialOptions, Dispatcher, SelectMode, StaticDiscovery};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let discovery = Arc::new(StaticDiscovery::new(vec![
//!     "tcp@127.0.0.1:9001".to_string(),
//!     "tcp@127.0.0.1:9002".to_string(),
//! ]));
//! let dispatcher = Dispatcher::new(discovery, SelectMode::RoundRobin, DialOptions::default());
//!
//! let token = CancellationToken::new();
//! let sum: i64 = dispatcher.call(&token, "Arith.Sum", json!({"a": 1, "b": 2})).await?;
//! let any: i64 = dispatcher.broadcast(&token, "Arith.Sum", json!({"a": 1, "b": 2})).await?;
//!
//! dispatcher.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use fanrpc_common::protocol::error::{FanrpcError, Result};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{Connection, DialOptions, Dialer, TransportDialer};
use crate::discovery::{Discovery, SelectMode};
use crate::pool::ConnectionPool;

/// Client that routes calls to endpoints chosen by a [`Discovery`].
///
/// Safe to share between tasks; all state is internally synchronized.
#[derive(Debug)]
pub struct Dispatcher {
    discovery: Arc<dyn Discovery>,
    mode: SelectMode,
    pool: ConnectionPool,
}

/// Per-broadcast outcome shared by the workers.
struct Outcome<R> {
    first_error: Option<FanrpcError>,
    reply: Option<R>,
}

impl Dispatcher {
    /// Creates a dispatcher dialing with the bundled TCP/HTTP transports.
    pub fn new(discovery: Arc<dyn Discovery>, mode: SelectMode, options: DialOptions) -> Self {
        Self::with_dialer(discovery, mode, Arc::new(TransportDialer::new(options)))
    }

    pub fn with_dialer(discovery: Arc<dyn Discovery>, mode: SelectMode, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            discovery,
            mode,
            pool: ConnectionPool::new(dialer),
        }
    }

    pub fn discovery(&self) -> &Arc<dyn Discovery> {
        &self.discovery
    }

    pub fn mode(&self) -> SelectMode {
        self.mode
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Returns a live connection to `addr`, reusing the cached one if healthy.
    pub async fn dial(&self, addr: &str) -> Result<Arc<dyn Connection>> {
        self.pool.acquire(addr).await
    }

    async fn call_addr(&self, token: &CancellationToken, addr: &str, service_method: &str, args: Value) -> Result<Value> {
        let conn = self.dial(addr).await?;
        conn.call(token, service_method, args).await
    }

    /// Calls `service_method` on one endpoint picked by the configured mode.
    ///
    /// # Errors
    ///
    /// Discovery, dial, transport and remote errors are returned unchanged.
    /// A reply that does not decode into `R` is a `JsonSerialization` error.
    pub async fn call<R, A>(&self, token: &CancellationToken, service_method: &str, args: A) -> Result<R>
    where
        R: DeserializeOwned,
        A: Serialize,
    {
        let args = serde_json::to_value(args)?;
        let addr = self.discovery.get(self.mode).await?;
        debug!(addr = %addr, method = %service_method, mode = %self.mode, "Dispatching call");

        let reply = self.call_addr(token, &addr, service_method, args).await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Calls `service_method` on every known endpoint and returns one reply.
    ///
    /// All endpoints are called concurrently. The first failure cancels a
    /// child of `token`: calls not yet sent are skipped, calls already sent
    /// are waited for. The caller's own token is never cancelled. The method
    /// returns only after every worker has finished.
    ///
    /// Any successful reply wins over failures. If every endpoint failed,
    /// the first recorded error is returned.
    pub async fn broadcast<R, A>(&self, token: &CancellationToken, service_method: &str, args: A) -> Result<R>
    where
        R: DeserializeOwned + Send,
        A: Serialize,
    {
        let outcome = self.fan_out::<R, A>(token, service_method, args).await?;
        match (outcome.reply, outcome.first_error) {
            (Some(reply), _) => Ok(reply),
            (None, Some(e)) => Err(e),
            (None, None) => Err(FanrpcError::NoAvailableServers),
        }
    }

    /// Like [`broadcast`](Self::broadcast) but discards replies.
    ///
    /// Succeeds only if every endpoint succeeded; otherwise returns the
    /// first recorded error.
    pub async fn broadcast_all<A>(&self, token: &CancellationToken, service_method: &str, args: A) -> Result<()>
    where
        A: Serialize,
    {
        let outcome = self.fan_out::<IgnoredAny, A>(token, service_method, args).await?;
        match outcome.first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn fan_out<R, A>(&self, token: &CancellationToken, service_method: &str, args: A) -> Result<Outcome<R>>
    where
        R: DeserializeOwned + Send,
        A: Serialize,
    {
        let args = serde_json::to_value(args)?;
        let servers = self.discovery.get_all().await?;
        debug!(method = %service_method, count = servers.len(), "Broadcasting call");

        let child = token.child_token();
        let outcome = Mutex::new(Outcome {
            first_error: None,
            reply: None,
        });

        let workers = servers.iter().map(|addr| {
            let child = &child;
            let outcome = &outcome;
            let args = args.clone();
            async move {
                let result = self
                    .call_addr(child, addr, service_method, args)
                    .await
                    .and_then(|value| serde_json::from_value::<R>(value).map_err(FanrpcError::from));

                let mut outcome = outcome.lock();
                match result {
                    Ok(reply) => {
                        if outcome.reply.is_none() {
                            outcome.reply = Some(reply);
                        }
                    }
                    Err(e) => {
                        warn!(addr = %addr, method = %service_method, error = %e, "Broadcast call failed");
                        if outcome.first_error.is_none() {
                            outcome.first_error = Some(e);
                            child.cancel();
                        }
                    }
                }
            }
        });
        join_all(workers).await;

        Ok(outcome.into_inner())
    }

    /// Closes every cached connection. Later calls dial fresh ones.
    pub async fn close(&self) -> Result<()> {
        self.pool.drain().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::StaticDiscovery;
    use crate::testing::{Behavior, MockDialer};
    use serde_json::json;
    use std::time::Duration;

    fn dispatcher(addrs: &[&str], mode: SelectMode, dialer: &Arc<MockDialer>) -> Dispatcher {
        let discovery = Arc::new(StaticDiscovery::new(addrs.iter().map(|s| s.to_string()).collect()));
        Dispatcher::with_dialer(discovery, mode, dialer.clone())
    }

    #[tokio::test]
    async fn test_call_round_robin() {
        let dialer = Arc::new(
            MockDialer::new()
                .endpoint("a", Behavior::Reply(json!("a")))
                .endpoint("b", Behavior::Reply(json!("b"))),
        );
        let d = dispatcher(&["a", "b"], SelectMode::RoundRobin, &dialer);
        let token = CancellationToken::new();

        let mut replies = Vec::new();
        for _ in 0..4 {
            replies.push(d.call::<String, _>(&token, "Svc.Who", json!(null)).await.unwrap());
        }
        assert_eq!(replies, vec!["a", "b", "a", "b"]);

        // one connection per endpoint, reused
        assert_eq!(dialer.dial_count("a"), 1);
        assert_eq!(dialer.dial_count("b"), 1);
        assert_eq!(dialer.connections("a")[0].calls(), 2);
    }

    #[tokio::test]
    async fn test_call_surfaces_remote_error() {
        let dialer = Arc::new(MockDialer::new().endpoint("a", Behavior::Fail("boom".into())));
        let d = dispatcher(&["a"], SelectMode::Random, &dialer);
        let token = CancellationToken::new();

        let err = d.call::<Value, _>(&token, "Svc.Method", json!(null)).await.unwrap_err();
        assert!(matches!(err, FanrpcError::Remote(_)));
    }

    #[tokio::test]
    async fn test_call_decode_failure() {
        let dialer = Arc::new(MockDialer::new().endpoint("a", Behavior::Reply(json!("not a number"))));
        let d = dispatcher(&["a"], SelectMode::Random, &dialer);
        let token = CancellationToken::new();

        let err = d.call::<i64, _>(&token, "Svc.Method", json!(null)).await.unwrap_err();
        assert!(matches!(err, FanrpcError::JsonSerialization(_)));
    }

    #[tokio::test]
    async fn test_call_with_empty_discovery() {
        let dialer = Arc::new(MockDialer::new());
        let d = dispatcher(&[], SelectMode::Random, &dialer);
        let token = CancellationToken::new();

        assert!(matches!(
            d.call::<Value, _>(&token, "Svc.Method", json!(null)).await,
            Err(FanrpcError::NoAvailableServers)
        ));
        assert!(matches!(
            d.broadcast::<Value, _>(&token, "Svc.Method", json!(null)).await,
            Err(FanrpcError::NoAvailableServers)
        ));
        assert!(matches!(
            d.broadcast_all(&token, "Svc.Method", json!(null)).await,
            Err(FanrpcError::NoAvailableServers)
        ));
    }

    #[tokio::test]
    async fn test_broadcast_success_masks_failure() {
        // b and c are already waiting on their replies when a's error
        // cancels the broadcast token
        let dialer = Arc::new(
            MockDialer::new()
                .slow_endpoint("b", Behavior::Reply(json!("b")), Duration::from_millis(50))
                .slow_endpoint("c", Behavior::Reply(json!("c")), Duration::from_millis(50))
                .endpoint("a", Behavior::Fail("down".into())),
        );
        let d = dispatcher(&["b", "c", "a"], SelectMode::Random, &dialer);
        let token = CancellationToken::new();

        let reply: String = d.broadcast(&token, "Svc.Who", json!(null)).await.unwrap();
        assert!(reply == "b" || reply == "c");
        // the caller's token is untouched
        assert!(!token.is_cancelled());
        for addr in ["b", "c"] {
            assert_eq!(dialer.connections(addr)[0].calls(), 1);
            assert!(d.pool().contains(addr).await);
            assert!(dialer.connections(addr)[0].is_available());
        }
    }

    #[tokio::test]
    async fn test_broadcast_skips_calls_not_yet_sent() {
        let dialer = Arc::new(
            MockDialer::new()
                .endpoint("a", Behavior::Fail("down".into()))
                .endpoint("b", Behavior::Reply(json!("b"))),
        );
        let d = dispatcher(&["a", "b"], SelectMode::Random, &dialer);
        let token = CancellationToken::new();

        // a fails before b is dialed, so b's call is never sent
        let err = d.broadcast::<String, _>(&token, "Svc.Who", json!(null)).await.unwrap_err();
        assert!(matches!(err, FanrpcError::Remote(msg) if msg == "a: down"));

        let b = &dialer.connections("b")[0];
        assert_eq!(b.calls(), 0);
        assert!(b.is_available());

        // the skipped connection stays cached and serves the next call
        let conn = d.dial("b").await.unwrap();
        assert_eq!(conn.call(&token, "Svc.Who", json!(null)).await.unwrap(), json!("b"));
        assert_eq!(dialer.dial_count("b"), 1);
    }

    #[tokio::test]
    async fn test_broadcast_all_fail_returns_one_error() {
        let dialer = Arc::new(
            MockDialer::new()
                .endpoint("a", Behavior::Fail("a down".into()))
                .endpoint("b", Behavior::Fail("b down".into()))
                .endpoint("c", Behavior::Fail("c down".into())),
        );
        let d = dispatcher(&["a", "b", "c"], SelectMode::Random, &dialer);
        let token = CancellationToken::new();

        let err = d.broadcast::<Value, _>(&token, "Svc.Method", json!(null)).await.unwrap_err();
        match err {
            FanrpcError::Remote(msg) => {
                assert!(["a: a down", "b: b down", "c: c down"].contains(&msg.as_str()));
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_endpoint() {
        let dialer = Arc::new(
            MockDialer::new()
                .endpoint("a", Behavior::Reply(json!(1)))
                .endpoint("b", Behavior::Reply(json!(2)))
                .endpoint("c", Behavior::Reply(json!(3))),
        );
        let d = dispatcher(&["a", "b", "c"], SelectMode::Random, &dialer);
        let token = CancellationToken::new();

        let reply: i64 = d.broadcast(&token, "Svc.Method", json!(null)).await.unwrap();
        assert!((1..=3).contains(&reply));
        for addr in ["a", "b", "c"] {
            assert_eq!(dialer.connections(addr)[0].calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_broadcast_first_error_cancels_siblings() {
        let dialer = Arc::new(
            MockDialer::new()
                .endpoint("b", Behavior::WaitForCancel)
                .endpoint("c", Behavior::WaitForCancel)
                .endpoint("a", Behavior::Fail("down".into())),
        );
        let d = dispatcher(&["b", "c", "a"], SelectMode::Random, &dialer);
        let token = CancellationToken::new();

        // b and c only return once a's failure cancels them
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            d.broadcast::<Value, _>(&token, "Svc.Method", json!(null)),
        )
        .await
        .expect("broadcast should finish once siblings are cancelled");

        assert!(matches!(result, Err(FanrpcError::Remote(_))));
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_broadcast_returns_after_caller_cancellation() {
        let dialer = Arc::new(
            MockDialer::new()
                .endpoint("a", Behavior::WaitForCancel)
                .endpoint("b", Behavior::WaitForCancel),
        );
        let d = dispatcher(&["a", "b"], SelectMode::Random, &dialer);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            d.broadcast::<Value, _>(&token, "Svc.Method", json!(null)),
        )
        .await
        .expect("broadcast should finish after cancellation");
        assert!(matches!(result, Err(FanrpcError::Cancelled)));
    }

    #[tokio::test]
    async fn test_broadcast_dial_failure_is_masked_by_success() {
        let dialer = Arc::new(MockDialer::new().endpoint("b", Behavior::Reply(json!("b"))));
        let d = dispatcher(&["b", "missing"], SelectMode::Random, &dialer);
        let token = CancellationToken::new();

        let reply: String = d.broadcast(&token, "Svc.Who", json!(null)).await.unwrap();
        assert_eq!(reply, "b");
    }

    #[tokio::test]
    async fn test_broadcast_all() {
        let ok = Arc::new(
            MockDialer::new()
                .endpoint("a", Behavior::Reply(json!({"any": "shape"})))
                .endpoint("b", Behavior::Reply(json!(null))),
        );
        let d = dispatcher(&["a", "b"], SelectMode::Random, &ok);
        let token = CancellationToken::new();
        d.broadcast_all(&token, "Svc.Method", json!(null)).await.unwrap();

        let partial = Arc::new(
            MockDialer::new()
                .endpoint("a", Behavior::Reply(json!(1)))
                .endpoint("b", Behavior::Fail("down".into())),
        );
        let d = dispatcher(&["a", "b"], SelectMode::Random, &partial);
        let err = d.broadcast_all(&token, "Svc.Method", json!(null)).await.unwrap_err();
        assert!(matches!(err, FanrpcError::Remote(_)));
    }

    #[tokio::test]
    async fn test_close_then_call_dials_fresh() {
        let dialer = Arc::new(MockDialer::new().endpoint("a", Behavior::Reply(json!(1))));
        let d = dispatcher(&["a"], SelectMode::RoundRobin, &dialer);
        let token = CancellationToken::new();

        d.call::<i64, _>(&token, "Svc.Method", json!(null)).await.unwrap();
        d.close().await.unwrap();

        assert!(d.pool().is_empty().await);
        assert!(dialer.connections("a")[0].is_closed());

        d.call::<i64, _>(&token, "Svc.Method", json!(null)).await.unwrap();
        assert_eq!(dialer.dial_count("a"), 2);
        assert!(!dialer.connections("a")[1].is_closed());
    }

    #[tokio::test]
    async fn test_broken_connection_redialed_on_next_call() {
        let dialer = Arc::new(MockDialer::new().endpoint("a", Behavior::Break));
        let d = dispatcher(&["a"], SelectMode::RoundRobin, &dialer);
        let token = CancellationToken::new();

        assert!(d.call::<Value, _>(&token, "Svc.Method", json!(null)).await.is_err());
        assert!(d.call::<Value, _>(&token, "Svc.Method", json!(null)).await.is_err());
        assert_eq!(dialer.dial_count("a"), 2);
        assert!(dialer.connections("a")[0].is_closed());
    }
}
