use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;

use drip_limit::AdmissionControl;
use drip_limit::LeakyBucket;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceExt;

use super::*;

use futures::future::Ready;
use futures::future::ready;

#[derive(Clone)]
struct MockService {
    pub count: Arc<AtomicUsize>,
}

impl Service<()> for MockService {
    type Response = ();
    type Error = BoxError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ()) -> Self::Future {
        self.count.fetch_add(1, Ordering::SeqCst);
        ready(Ok(()))
    }
}

// A gate that rejects everything, for exercising the error path in isolation
#[derive(Debug)]
struct DenyAll;

impl AdmissionControl for DenyAll {
    fn allow(&self) -> bool {
        false
    }

    fn peek_fill(&self) -> f64 {
        0.0
    }
}

fn assert_rate_limited(err: &BoxError) {
    let drip = err
        .downcast_ref::<DripError>()
        .expect("expected a DripError");
    assert!(matches!(drip, DripError::RateLimited));
}

#[tokio::test]
async fn test_admits_until_capacity_then_rejects() {
    // Zero leak rate makes the bound exact: two in, the rest out.
    let gate = Arc::new(LeakyBucket::new(0.0, 2.0));
    let count = Arc::new(AtomicUsize::new(0));
    let mut service = AdmissionLayer::new(gate).layer(MockService {
        count: count.clone(),
    });

    service.ready().await.unwrap().call(()).await.unwrap();
    service.ready().await.unwrap().call(()).await.unwrap();

    match service.ready().await {
        Ok(_) => panic!("third request must be rejected"),
        Err(err) => assert_rate_limited(&err),
    }

    // The inner service never saw the rejected request
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_shared_state_across_clones() {
    let gate = Arc::new(LeakyBucket::new(0.0, 1.0));
    let layer = AdmissionLayer::new(gate);

    let mut svc1 = layer.layer(MockService {
        count: Arc::new(AtomicUsize::new(0)),
    });
    let mut svc2 = layer.layer(MockService {
        count: Arc::new(AtomicUsize::new(0)),
    });

    svc1.ready().await.unwrap().call(()).await.unwrap();

    // svc2 is rejected because svc1 consumed the only unit
    match svc2.ready().await {
        Ok(_) => panic!("second service must share the exhausted gate"),
        Err(err) => assert_rate_limited(&err),
    }
}

#[tokio::test]
async fn test_layer_integration() {
    let gate = Arc::new(LeakyBucket::new(100.0, 100.0));

    let mut service = tower::ServiceBuilder::new()
        .layer(AdmissionLayer::new(gate))
        .service(MockService {
            count: Arc::new(AtomicUsize::new(0)),
        });

    // Verify it handles a basic request
    service.ready().await.unwrap().call(()).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_hammer() {
    let capacity = 50usize;
    let gate = Arc::new(LeakyBucket::new(0.0, capacity as f64));

    let mock_count = Arc::new(AtomicUsize::new(0));
    let service = AdmissionLayer::new(gate.clone()).layer(MockService {
        count: mock_count.clone(),
    });

    let mut handles = vec![];
    for _ in 0..100 {
        let mut svc = service.clone();
        handles.push(tokio::spawn(async move {
            match svc.ready().await {
                Ok(ready_svc) => ready_svc.call(()).await,
                Err(e) => Err(e),
            }
        }));
    }

    let mut success = 0;
    let mut rejected = 0;
    for h in handles {
        match h.await.expect("task panicked") {
            Ok(_) => success += 1,
            Err(err) => {
                assert_rate_limited(&err);
                rejected += 1;
            }
        }
    }

    assert_eq!(success, capacity, "exactly capacity requests admitted");
    assert_eq!(rejected, 100 - capacity);
    assert_eq!(mock_count.load(Ordering::SeqCst), capacity);
    assert_eq!(gate.allowed_total(), capacity as u64);
}

#[tokio::test]
async fn test_inner_error_wrapped_in_domain() {
    let gate = Arc::new(LeakyBucket::new(0.0, 10.0));
    let failing = tower::service_fn(|_: ()| async { Err::<(), BoxError>("boom".into()) });
    let mut service = AdmissionLayer::new(gate).layer(failing);

    let err = service
        .ready()
        .await
        .unwrap()
        .call(())
        .await
        .expect_err("inner failure must surface");

    match err.downcast_ref::<DripError>() {
        Some(DripError::Inner(msg)) => assert!(msg.contains("boom")),
        other => panic!("expected DripError::Inner, got {:?}", other),
    }
}

#[tokio::test]
async fn test_trait_object_gate() {
    // The layer works over Arc<dyn ...> so callers can pick the gate at runtime
    let gate: Arc<dyn AdmissionControl + Send + Sync> = Arc::new(LeakyBucket::new(0.0, 1.0));
    let mut service = AdmissionLayer::new(gate).layer(MockService {
        count: Arc::new(AtomicUsize::new(0)),
    });

    service.ready().await.unwrap().call(()).await.unwrap();
    assert!(service.ready().await.is_err());
}

#[tokio::test]
async fn test_rejection_has_no_side_effects() {
    let count = Arc::new(AtomicUsize::new(0));
    let mut service = AdmissionLayer::new(Arc::new(DenyAll)).layer(MockService {
        count: count.clone(),
    });

    for _ in 0..5 {
        match service.ready().await {
            Ok(_) => panic!("DenyAll must reject"),
            Err(err) => assert_rate_limited(&err),
        }
    }

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[cfg(feature = "axum")]
#[test]
fn test_rate_limited_maps_to_429() {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    let response = DripError::RateLimited.into_response();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = DripError::Inner("db down".to_string()).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
