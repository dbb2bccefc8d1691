//! Frame construction and error classification.

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_request_defaults() {
        let req = Request::new("Arith.Sum", json!({"a": 1, "b": 2}));
        assert_eq!(req.service_method, "Arith.Sum");
        assert!(req.timeout_ms.is_none());

        let encoded = serde_json::to_value(&req).unwrap();
        assert!(encoded.get("timeout_ms").is_none());
        assert_eq!(req.with_timeout(250).timeout_ms, Some(250));
    }

    #[test]
    fn test_split_service_method() {
        let split = |name: &str| {
            Request::new(name, json!(null))
                .split_service_method()
                .map(|(s, m)| (s.to_string(), m.to_string()))
        };

        assert_eq!(split("Arith.Sum"), Some(("Arith".into(), "Sum".into())));
        assert_eq!(split("pkg.Arith.Sum"), Some(("pkg.Arith".into(), "Sum".into())));
        assert_eq!(split("NoDot"), None);
        assert_eq!(split(".Sum"), None);
        assert_eq!(split("Arith."), None);
    }

    #[test]
    fn test_request_ids_are_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..500)
                        .map(|_| Request::new("Echo.Echo", json!({})).id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<RequestId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(ids.len(), 4000);
    }

    #[test]
    fn test_response_from_result() {
        let ok = Response::from_result(3, Ok(json!([1, 2])));
        assert!(ok.success);
        assert_eq!(ok.into_result().unwrap(), json!([1, 2]));

        let failed = Response::from_result(3, Err(FanrpcError::InvalidRequest("bad args".into())));
        assert!(!failed.success);
        match failed.into_result() {
            Err(FanrpcError::Remote(msg)) => assert_eq!(msg, "Invalid request: bad args"),
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_remote_error_message_is_kept() {
        match Response::error(1, "division by zero").into_result() {
            Err(FanrpcError::Remote(msg)) => assert_eq!(msg, "division by zero"),
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_unset_fields_are_omitted() {
        let encoded = serde_json::to_value(Response::success(2, json!("ok"))).unwrap();
        assert_eq!(encoded, json!({"id": 2, "result": "ok", "success": true}));

        let decoded: Response = serde_json::from_value(json!({"id": 2, "success": false})).unwrap();
        assert!(matches!(decoded.into_result(), Err(FanrpcError::Remote(msg)) if msg == "unknown error"));
    }

    #[test]
    fn test_success_without_result_is_invalid() {
        let resp = Response {
            id: 1,
            result: None,
            error: None,
            success: true,
        };
        assert!(matches!(resp.into_result(), Err(FanrpcError::InvalidResponse(_))));
    }

    #[test]
    fn test_breaks_connection() {
        assert!(FanrpcError::Timeout(10).breaks_connection());
        assert!(!FanrpcError::Cancelled.breaks_connection());
        assert!(FanrpcError::Connection("reset".into()).breaks_connection());
        assert!(!FanrpcError::Remote("bad args".into()).breaks_connection());
        assert!(!FanrpcError::NoAvailableServers.breaks_connection());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            FanrpcError::NoAvailableServers.to_string(),
            "rpc discovery: no available servers"
        );
        let err = FanrpcError::dial("tcp@127.0.0.1:1", "connection refused");
        assert!(err.to_string().contains("tcp@127.0.0.1:1"));
        assert!(err.to_string().contains("connection refused"));
    }
}
