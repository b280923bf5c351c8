//! Integration tests for batch dispatch.
//!
//! These tests verify batch fan-out: concurrency, response ordering,
//! failure containment between members, context propagation, and
//! notification handling.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use jsonrpc_router::rpc::{to_result, Context, Router};
use serde_json::Value;

fn request(method: &str, id: usize) -> String {
    format!(r#"{{"jsonrpc":"2.0","method":"{method}","params":[{id}],"id":{id}}}"#)
}

fn batch_of(requests: &[String]) -> String {
    format!("[{}]", requests.join(","))
}

async fn serve(router: &Router, payload: &str) -> Value {
    let out = router
        .serve(&Context::new(), payload.as_bytes())
        .await
        .expect("batch produced a response");
    serde_json::from_slice(&out).expect("response is JSON")
}

fn echo_router() -> Router {
    Router::builder()
        .register("echo", |_, _, _, params| match params {
            Some(raw) => Ok(raw.to_owned()),
            None => to_result(&()),
        })
        .register("slow_echo", |_, id, _, params| {
            // Early members sleep longest so they finish last.
            let n = id.as_i64().unwrap_or(0);
            thread::sleep(Duration::from_millis(5 * (10 - n.clamp(0, 10)).unsigned_abs()));
            params.map_or_else(|| to_result(&()), |raw| Ok(raw.to_owned()))
        })
        .register("panic", |_, _, _, _| panic!("member exploded"))
        .build()
}

// =============================================================================
// Shape
// =============================================================================

#[tokio::test]
async fn test_batch_yields_one_response_per_member() {
    let requests: Vec<String> = (0..25).map(|i| request("echo", i)).collect();
    let value = serve(&echo_router(), &batch_of(&requests)).await;

    let responses = value.as_array().expect("batch response is an array");
    assert_eq!(responses.len(), 25);

    let ids: HashSet<i64> = responses.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    let expected: HashSet<i64> = (0..25).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_batch_output_follows_input_order() {
    let requests: Vec<String> = (0..10).map(|i| request("slow_echo", i)).collect();
    let value = serve(&echo_router(), &batch_of(&requests)).await;

    let ids: Vec<i64> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_single_member_batch_is_still_an_array() {
    let out = echo_router()
        .serve(&Context::new(), request("echo", 1).as_bytes())
        .await
        .unwrap();
    assert!(out.starts_with(b"{"));

    let value = serve(&echo_router(), &batch_of(&[request("echo", 1)])).await;
    assert_eq!(value.as_array().map(Vec::len), Some(1));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_members_run_concurrently() {
    const MEMBERS: usize = 4;

    let arrived = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&arrived);
    let router = Router::builder()
        .register("rendezvous", move |_, _, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Succeeds only if every member is in flight at the same time.
            let give_up = Instant::now() + Duration::from_secs(5);
            while counter.load(Ordering::SeqCst) < MEMBERS {
                if Instant::now() > give_up {
                    return to_result(&false);
                }
                thread::sleep(Duration::from_millis(1));
            }
            to_result(&true)
        })
        .build();

    let requests: Vec<String> = (0..MEMBERS).map(|i| request("rendezvous", i)).collect();
    let value = serve(&router, &batch_of(&requests)).await;

    for response in value.as_array().unwrap() {
        assert_eq!(response["result"], true, "member ran in isolation: {response}");
    }
    assert_eq!(arrived.load(Ordering::SeqCst), MEMBERS);
}

#[tokio::test]
async fn test_context_reaches_every_member() {
    let router = Router::builder()
        .register("cancelled", |ctx, _, _, _| to_result(&ctx.is_cancelled()))
        .build();
    let payload = batch_of(&[request("cancelled", 1), request("cancelled", 2)]);

    let ctx = Context::new();
    ctx.cancel();
    let out = router.serve(&ctx, payload.as_bytes()).await.unwrap();
    let value: Value = serde_json::from_slice(&out).unwrap();

    for response in value.as_array().unwrap() {
        assert_eq!(response["result"], true);
    }
}

// =============================================================================
// Failure Containment
// =============================================================================

#[tokio::test]
async fn test_panicking_member_does_not_affect_siblings() {
    let payload = batch_of(&[
        request("echo", 1),
        request("panic", 2),
        request("echo", 3),
    ]);
    let value = serve(&echo_router(), &payload).await;
    let responses = value.as_array().unwrap();

    assert_eq!(responses[0]["result"], serde_json::json!([1]));
    assert_eq!(responses[1]["error"]["code"], 1000);
    assert_eq!(responses[1]["error"]["message"], "Internal error");
    assert_eq!(responses[1]["id"], 2);
    assert_eq!(responses[2]["result"], serde_json::json!([3]));
}

#[tokio::test]
async fn test_router_survives_a_panic() {
    let router = echo_router();
    serve(&router, &batch_of(&[request("panic", 1)])).await;

    let value = serve(&router, &batch_of(&[request("echo", 2)])).await;
    assert_eq!(value[0]["result"], serde_json::json!([2]));
}

#[tokio::test]
async fn test_members_fail_independently() {
    let payload = r#"[
        {"jsonrpc":"2.0","method":"echo","params":[1],"id":1},
        {"jsonrpc":"1.0","method":"echo","id":2},
        {"jsonrpc":"2.0","method":"missing","id":3},
        {"jsonrpc":"2.0","method":"rpc.echo","id":4},
        42,
        {"jsonrpc":"2.0","method":"echo","id":{"bad":true}}
    ]"#;
    let value = serve(&echo_router(), payload).await;
    let responses = value.as_array().unwrap();

    assert_eq!(responses.len(), 6);
    assert_eq!(responses[0]["result"], serde_json::json!([1]));
    assert_eq!(responses[1]["error"]["code"], -32600);
    assert_eq!(responses[1]["id"], 2);
    assert_eq!(responses[2]["error"]["code"], -32601);
    assert_eq!(responses[3]["error"]["code"], -32600);
    assert_eq!(responses[3]["id"], 4);
    assert_eq!(responses[4]["error"]["code"], -32600);
    assert!(responses[4]["id"].is_null());
    assert_eq!(responses[5]["error"]["code"], -32600);
    assert!(responses[5]["id"].is_null());
}

// =============================================================================
// Batch-Level Errors
// =============================================================================

#[tokio::test]
async fn test_malformed_batch_is_one_parse_error() {
    let value = serve(&echo_router(), r#"[{"jsonrpc":"2.0","method":"echo","id":1},"#).await;
    assert!(value.is_object());
    assert_eq!(value["error"]["code"], -32700);
    assert!(value["id"].is_null());
}

#[tokio::test]
async fn test_empty_batch_is_one_invalid_request() {
    let value = serve(&echo_router(), "[ ]").await;
    assert!(value.is_object());
    assert_eq!(value["error"]["code"], -32600);
    assert!(value["id"].is_null());
}

#[tokio::test]
async fn test_oversized_batch_is_rejected_whole() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let router = Router::builder()
        .register("count", move |_, _, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            to_result(&())
        })
        .max_batch_size(Some(2))
        .build();

    let requests: Vec<String> = (0..3).map(|i| request("count", i)).collect();
    let value = serve(&router, &batch_of(&requests)).await;
    assert_eq!(value["error"]["code"], -32600);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let value = serve(&router, &batch_of(&requests[..2])).await;
    assert_eq!(value.as_array().map(Vec::len), Some(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test]
async fn test_notifications_are_answered_by_default() {
    let payload = r#"[{"jsonrpc":"2.0","method":"echo","params":[1]}]"#;
    let value = serve(&echo_router(), payload).await;

    assert_eq!(value[0]["result"], serde_json::json!([1]));
    assert!(value[0]["id"].is_null());
}

#[tokio::test]
async fn test_suppressed_notifications_run_but_are_not_answered() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let router = Router::builder()
        .register("notify", move |_, _, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            to_result(&())
        })
        .suppress_notifications(true)
        .build();
    let ctx = Context::new();

    let mixed = r#"[
        {"jsonrpc":"2.0","method":"notify"},
        {"jsonrpc":"2.0","method":"notify","id":1},
        {"jsonrpc":"2.0","method":"missing"},
        {"jsonrpc":"1.0","method":"notify"}
    ]"#;
    let out = router.serve(&ctx, mixed.as_bytes()).await.unwrap();
    let value: Value = serde_json::from_slice(&out).unwrap();
    let responses = value.as_array().unwrap();

    // The call and the invalid envelope are answered; both notifications are not.
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[1]["error"]["code"], -32600);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let only_notifications =
        r#"[{"jsonrpc":"2.0","method":"notify"},{"jsonrpc":"2.0","method":"notify"}]"#;
    assert!(router.serve(&ctx, only_notifications.as_bytes()).await.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let single = br#"{"jsonrpc":"2.0","method":"notify"}"#;
    assert!(router.serve(&ctx, single).await.is_none());
}
