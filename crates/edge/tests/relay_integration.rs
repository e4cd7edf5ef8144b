//! End-to-end tests over loopback sockets: ingest, filtering, forwarding and
//! control-driven updates of the tracked entities.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use clienthog_edge::control::{self, ACKNOWLEDGEMENT, CONTROL_PATH};
use clienthog_edge::{
    DeviceId, DispatchError, FogTransport, ForwardEnvelope, FrameDispatcher, IngestLoop,
    RawFrame, SourceAllowList, TrackedEntityStore, TransportError, UdpFogTransport,
    UnmatchedPolicy, MAX_FRAME_SIZE,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tower::ServiceExt;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

/// Fog transport double handing every envelope to a channel.
struct ChannelTransport {
    tx: mpsc::UnboundedSender<ForwardEnvelope>,
}

#[async_trait]
impl FogTransport for ChannelTransport {
    async fn forward(&self, envelope: &ForwardEnvelope) -> Result<(), TransportError> {
        let _ = self.tx.send(envelope.clone());
        Ok(())
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

struct Harness {
    store: Arc<TrackedEntityStore>,
    ingest_addr: SocketAddr,
    forwarded: mpsc::UnboundedReceiver<ForwardEnvelope>,
    camera: UdpSocket,
}

impl Harness {
    async fn start(policy: UnmatchedPolicy) -> Self {
        let (tx, forwarded) = mpsc::unbounded_channel();
        let store = Arc::new(TrackedEntityStore::new(names(&["Bear", "Racoon", "Gazelle"])));
        let dispatcher = Arc::new(
            FrameDispatcher::new(DeviceId::new(352), Arc::new(ChannelTransport { tx }))
                .with_unmatched_policy(policy),
        );
        let ingest = IngestLoop::bind(
            "127.0.0.1:0",
            Arc::new(SourceAllowList::default()),
            Arc::clone(&store),
            dispatcher,
        )
        .await
        .unwrap();
        let ingest_addr = ingest.local_addr().unwrap();
        tokio::spawn(ingest.run());

        let camera = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Self {
            store,
            ingest_addr,
            forwarded,
            camera,
        }
    }

    async fn send(&self, payload: &[u8]) {
        self.camera.send_to(payload, self.ingest_addr).await.unwrap();
    }

    async fn next_forward(&mut self) -> ForwardEnvelope {
        timeout(WAIT, self.forwarded.recv())
            .await
            .expect("no frame forwarded")
            .expect("transport channel closed")
    }

    async fn assert_nothing_forwarded(&mut self) {
        assert!(
            timeout(QUIET, self.forwarded.recv()).await.is_err(),
            "unexpected forward"
        );
    }
}

async fn control_request(
    store: &Arc<TrackedEntityStore>,
    method: Method,
    body: &str,
) -> (StatusCode, Option<String>, String) {
    let response = control::router(Arc::clone(store))
        .oneshot(
            Request::builder()
                .method(method)
                .uri(CONTROL_PATH)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

async fn post_entities(
    store: &Arc<TrackedEntityStore>,
    body: &str,
) -> (StatusCode, Option<String>, String) {
    control_request(store, Method::POST, body).await
}

#[tokio::test]
async fn control_update_replaces_tracked_list_and_acknowledges() {
    let store = Arc::new(TrackedEntityStore::new(names(&["Bear", "Racoon", "Gazelle"])));

    let (status, content_type, body) = post_entities(&store, r#"["Wolf"]"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("text/plain"));
    assert_eq!(body, ACKNOWLEDGEMENT);
    assert_eq!(store.snapshot().as_slice(), names(&["Wolf"]));
}

#[tokio::test]
async fn malformed_control_body_is_rejected_without_state_change() {
    let store = Arc::new(TrackedEntityStore::new(names(&["Bear", "Racoon", "Gazelle"])));
    let before = store.snapshot();

    for bad in [r#"{"animals":["Wolf"]}"#, r#"["Wolf", 3]"#, "Wolf", ""] {
        let (status, _, _) = post_entities(&store, bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {bad:?}");
    }

    assert!(store.snapshot().ptr_eq(&before));
}

#[tokio::test]
async fn empty_list_is_a_valid_update() {
    let store = Arc::new(TrackedEntityStore::new(names(&["Bear"])));
    let (status, _, _) = post_entities(&store, "[]").await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn other_methods_update_like_post() {
    let store = Arc::new(TrackedEntityStore::new(names(&["Bear"])));

    let (status, _, body) = control_request(&store, Method::PUT, r#"["Wolf"]"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, ACKNOWLEDGEMENT);
    assert_eq!(store.snapshot().as_slice(), names(&["Wolf"]));
}

#[tokio::test]
async fn control_get_returns_current_list() {
    let store = Arc::new(TrackedEntityStore::new(names(&["Bear", "Lynx"])));
    let response = control::router(Arc::clone(&store))
        .oneshot(Request::builder().uri(CONTROL_PATH).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let listed: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(listed, names(&["Bear", "Lynx"]));
}

#[tokio::test]
async fn unapproved_source_never_reaches_dispatcher() {
    let (tx, mut forwarded) = mpsc::unbounded_channel();
    let store = Arc::new(TrackedEntityStore::new(names(&["Bear"])));
    let dispatcher = Arc::new(FrameDispatcher::new(
        DeviceId::new(352),
        Arc::new(ChannelTransport { tx }),
    ));
    let ingest = IngestLoop::from_socket(
        UdpSocket::bind("127.0.0.1:0").await.unwrap(),
        Arc::new(SourceAllowList::new(["localhost", "127.0.0.1"])),
        store,
        dispatcher,
    );

    let foreign: SocketAddr = "10.0.0.9:40000".parse().unwrap();
    assert!(!ingest.on_datagram(b"Bear|frame", foreign));
    assert!(timeout(QUIET, forwarded.recv()).await.is_err());

    let local: SocketAddr = "127.0.0.1:40000".parse().unwrap();
    assert!(ingest.on_datagram(b"Bear|frame", local));
    assert!(timeout(WAIT, forwarded.recv()).await.unwrap().is_some());
}

#[tokio::test]
async fn tracked_frame_is_forwarded_with_device_identity() {
    let mut harness = Harness::start(UnmatchedPolicy::Drop).await;

    harness.send(b"Gazelle|frame-7").await;
    let envelope = harness.next_forward().await;

    assert_eq!(envelope.device_id, DeviceId::new(352));
    assert_eq!(envelope.entity.as_deref(), Some("Gazelle"));
    assert_eq!(envelope.payload, b"Gazelle|frame-7");
    assert_eq!(envelope.source, harness.camera.local_addr().unwrap().to_string());
}

#[tokio::test]
async fn untracked_frame_is_not_forwarded_until_control_update() {
    let mut harness = Harness::start(UnmatchedPolicy::Drop).await;

    harness.send(b"Wolf|frame-1").await;
    harness.assert_nothing_forwarded().await;

    let (status, _, _) = post_entities(&harness.store, r#"["Wolf"]"#).await;
    assert_eq!(status, StatusCode::OK);

    harness.send(b"Wolf|frame-2").await;
    let envelope = harness.next_forward().await;
    assert_eq!(envelope.payload, b"Wolf|frame-2");

    // Previously tracked entities are no longer forwarded.
    harness.send(b"Bear|frame-3").await;
    harness.assert_nothing_forwarded().await;
}

#[tokio::test]
async fn forward_policy_relays_everything() {
    let mut harness = Harness::start(UnmatchedPolicy::Forward).await;

    harness.send(b"Wolf|frame-1").await;
    let envelope = harness.next_forward().await;
    assert_eq!(envelope.entity.as_deref(), Some("Wolf"));
}

#[tokio::test]
async fn frames_reach_fog_node_over_udp() {
    let fog = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let transport = UdpFogTransport::connect(&fog.local_addr().unwrap().to_string())
        .await
        .unwrap();
    let store = Arc::new(TrackedEntityStore::new(names(&["Bear"])));
    let dispatcher = Arc::new(FrameDispatcher::new(DeviceId::new(352), Arc::new(transport)));
    let ingest = IngestLoop::bind(
        "127.0.0.1:0",
        Arc::new(SourceAllowList::default()),
        store,
        dispatcher,
    )
    .await
    .unwrap();
    let ingest_addr = ingest.local_addr().unwrap();
    tokio::spawn(ingest.run());

    let camera = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    camera.send_to(b"Bear|\xff\xd8\xff\xe0", ingest_addr).await.unwrap();

    let mut buf = vec![0u8; 4096];
    let (n, _) = timeout(WAIT, fog.recv_from(&mut buf)).await.unwrap().unwrap();
    let envelope: ForwardEnvelope = serde_json::from_slice(&buf[..n]).unwrap();
    assert_eq!(envelope.device_id.get(), 352);
    assert_eq!(envelope.payload, b"Bear|\xff\xd8\xff\xe0");
}

#[tokio::test]
async fn oversized_datagrams_are_dropped_not_truncated() {
    let mut harness = Harness::start(UnmatchedPolicy::Drop).await;

    let mut oversized = b"Bear|".to_vec();
    oversized.resize(MAX_FRAME_SIZE + 100, b'x');
    harness.send(&oversized).await;
    harness.assert_nothing_forwarded().await;

    let mut full = b"Bear|".to_vec();
    full.resize(MAX_FRAME_SIZE, b'x');
    harness.send(&full).await;
    let envelope = harness.next_forward().await;
    assert_eq!(envelope.payload.len(), MAX_FRAME_SIZE);
}

#[tokio::test]
async fn localhost_ingest_accepts_loopback_cameras() {
    let (tx, mut forwarded) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(FrameDispatcher::new(
        DeviceId::new(352),
        Arc::new(ChannelTransport { tx }),
    ));
    let ingest = IngestLoop::bind(
        "localhost:0",
        Arc::new(SourceAllowList::default()),
        Arc::new(TrackedEntityStore::new(names(&["Bear"]))),
        dispatcher,
    )
    .await
    .unwrap();
    let ingest_addr = ingest.local_addr().unwrap();
    assert!(ingest_addr.is_ipv4());
    tokio::spawn(ingest.run());

    let camera = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    camera.send_to(b"Bear|frame", ingest_addr).await.unwrap();
    let envelope = timeout(WAIT, forwarded.recv()).await.unwrap().unwrap();
    assert_eq!(envelope.entity.as_deref(), Some("Bear"));
}

#[tokio::test]
async fn refused_forward_does_not_stop_later_frames() {
    let fog_addr = {
        let fog = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        fog.local_addr().unwrap()
    };
    let transport = UdpFogTransport::connect(&fog_addr.to_string()).await.unwrap();
    let store = Arc::new(TrackedEntityStore::new(names(&["Bear"])));
    let dispatcher = Arc::new(FrameDispatcher::new(DeviceId::new(352), Arc::new(transport)));

    // Nothing listens on the fog port: forwards end up refused.
    let mut refused = false;
    for _ in 0..20 {
        let frame = RawFrame::new(b"Bear|lost".to_vec(), "127.0.0.1:9".parse().unwrap());
        match dispatcher.handle(frame, store.snapshot()).await {
            Err(DispatchError::Forward(TransportError::Refused(addr))) => {
                assert_eq!(addr, fog_addr);
                refused = true;
                break;
            }
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    assert!(refused, "closed fog port never reported a refusal");

    let ingest = IngestLoop::bind(
        "127.0.0.1:0",
        Arc::new(SourceAllowList::default()),
        store,
        dispatcher,
    )
    .await
    .unwrap();
    let ingest_addr = ingest.local_addr().unwrap();
    tokio::spawn(ingest.run());

    let camera = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for _ in 0..3 {
        camera.send_to(b"Bear|lost", ingest_addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // The fog node comes back; the same ingest loop keeps forwarding.
    let fog = UdpSocket::bind(fog_addr).await.unwrap();
    let mut buf = vec![0u8; 4096];
    for _ in 0..10 {
        camera.send_to(b"Bear|again", ingest_addr).await.unwrap();
        if let Ok(Ok((n, _))) = timeout(QUIET, fog.recv_from(&mut buf)).await {
            let envelope: ForwardEnvelope = serde_json::from_slice(&buf[..n]).unwrap();
            assert_eq!(envelope.payload, b"Bear|again");
            return;
        }
    }
    panic!("no frame forwarded after the fog node recovered");
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap().to_string();
    let (tx, _rx) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(FrameDispatcher::new(
        DeviceId::new(1),
        Arc::new(ChannelTransport { tx }),
    ));

    let err = IngestLoop::bind(
        &addr,
        Arc::new(SourceAllowList::default()),
        Arc::new(TrackedEntityStore::default()),
        dispatcher,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, clienthog_edge::IngestError::Bind { .. }));
}
