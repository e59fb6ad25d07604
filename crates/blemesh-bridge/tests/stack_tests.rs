//! Integration tests for the mesh stack runtime
//!
//! These drive a running MeshStack through its StackHandle and a MockTransport,
//! and observe what reaches the application callbacks:
//! - Request/status correlation and timeouts end to end
//! - One outstanding request per destination
//! - Event skipping for unregistered subsystems
//! - Deep copy of caller buffers and the copy policies
//! - Provisioning pass-through and shutdown

use blemesh_bridge::{
    CallbackRegistry, ClientCallbacks, MeshStack, ModelCallbacks, ProvCallbacks, ReceivedMessage,
    SendComplete, StackHandle, TimeoutNotice,
};
use blemesh_core::{
    Address, CopyPolicy, MeshError, MsgContext, Opcode, Result, Role, StackConfig,
    StackConfigBuilder,
};
use blemesh_models::test_utils::{MockTransport, MockTransportHandle};
use blemesh_models::{
    sig, Bearer, Composition, Element, InboundMessage, Model, ModelId, ModelIdentifier, ProvAction,
    ProvCall, ProvEvent, Request, Subsystem,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

const ONOFF_GET: Opcode = Opcode::two(0x82, 0x01);
const ONOFF_SET: Opcode = Opcode::two(0x82, 0x02);
const ONOFF_SET_UNACK: Opcode = Opcode::two(0x82, 0x03);
const ONOFF_STATUS: Opcode = Opcode::two(0x82, 0x04);

const ONOFF_CLI: ModelId = ModelId::new(0, 0);
const ONOFF_SRV: ModelId = ModelId::new(0, 1);
const SENSOR_CLI: ModelId = ModelId::new(0, 2);

const LOCAL: Address = Address::new(0x0001);
const PEER: Address = Address::new(0x0010);
const OTHER_PEER: Address = Address::new(0x0011);

// ============================================================================
// Test Infrastructure
// ============================================================================

/// What the application callbacks saw
#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Matched(Opcode, ReceivedMessage),
    Unsolicited(ReceivedMessage),
    Timeout(TimeoutNotice),
    SendComplete(SendComplete),
    Operation(ReceivedMessage),
    ServerSendComplete(SendComplete),
    PublishComplete(ModelId, Opcode, Result<()>),
    Prov(ProvEvent),
}

struct Recorder {
    tx: mpsc::UnboundedSender<Seen>,
}

impl Recorder {
    fn record(&self, seen: Seen) {
        let _ = self.tx.send(seen);
    }
}

impl ClientCallbacks for Recorder {
    fn on_matched(&self, request: Opcode, message: &ReceivedMessage) {
        self.record(Seen::Matched(request, message.clone()));
    }

    fn on_unsolicited(&self, message: &ReceivedMessage) {
        self.record(Seen::Unsolicited(message.clone()));
    }

    fn on_timeout(&self, notice: &TimeoutNotice) {
        self.record(Seen::Timeout(notice.clone()));
    }

    fn on_send_complete(&self, complete: &SendComplete) {
        self.record(Seen::SendComplete(complete.clone()));
    }
}

impl ModelCallbacks for Recorder {
    fn on_operation(&self, message: &ReceivedMessage) {
        self.record(Seen::Operation(message.clone()));
    }

    fn on_send_complete(&self, complete: &SendComplete) {
        self.record(Seen::ServerSendComplete(complete.clone()));
    }

    fn on_publish_complete(&self, model: ModelId, opcode: Opcode, result: &Result<()>) {
        self.record(Seen::PublishComplete(model, opcode, result.clone()));
    }
}

impl ProvCallbacks for Recorder {
    fn on_prov_event(&self, event: &ProvEvent) {
        self.record(Seen::Prov(event.clone()));
    }
}

fn composition() -> Composition {
    Composition::new()
        .with_element(
            Element::new(0)
                .with_model(Model::generic_onoff_client())
                .with_model(Model::server(ModelIdentifier::Sig(sig::GEN_ONOFF_SRV)))
                .with_model(Model::sensor_client()),
        )
        .unwrap()
}

/// Transport whose peer answers every OnOff Get/Set with a Status carrying `[0x01]`
fn onoff_peer() -> MockTransport {
    MockTransport::new().with_responder(|sent| {
        if sent.opcode != ONOFF_GET && sent.opcode != ONOFF_SET {
            return None;
        }
        Some(InboundMessage {
            model: sent.model,
            ctx: MsgContext::received(sent.ctx.addr, LOCAL),
            opcode: ONOFF_STATUS,
            payload: Bytes::from_static(&[0x01]),
        })
    })
}

struct Harness {
    handle: StackHandle,
    transport: MockTransportHandle,
    seen: mpsc::UnboundedReceiver<Seen>,
    stack: JoinHandle<Result<()>>,
    delivery: JoinHandle<u64>,
}

impl Harness {
    fn start(config: StackConfig, transport: MockTransport) -> Self {
        Self::launch(config, transport, None)
    }

    /// Start with the application side stalled until the sender fires
    fn start_stalled(
        config: StackConfig,
        transport: MockTransport,
    ) -> (Self, oneshot::Sender<()>) {
        let (release_tx, release_rx) = oneshot::channel();
        (Self::launch(config, transport, Some(release_rx)), release_tx)
    }

    fn launch(
        config: StackConfig,
        transport: MockTransport,
        release: Option<oneshot::Receiver<()>>,
    ) -> Self {
        let (tx, seen) = mpsc::unbounded_channel();
        let recorder = Arc::new(Recorder { tx });

        // the sensor client is left unregistered on purpose
        let registry = CallbackRegistry::new();
        registry
            .register_client(Subsystem::GenericClient, recorder.clone())
            .unwrap();
        registry.register_model(recorder.clone());
        registry.register_prov(recorder);

        let transport_handle = transport.handle();
        let (stack, handle, delivery) =
            MeshStack::new(config, composition(), transport, registry).unwrap();

        Self {
            handle,
            transport: transport_handle,
            seen,
            stack: tokio::spawn(stack.run()),
            delivery: tokio::spawn(async move {
                if let Some(release) = release {
                    let _ = release.await;
                }
                delivery.run().await
            }),
        }
    }

    async fn next(&mut self) -> Seen {
        self.seen.recv().await.expect("event stream ended")
    }

    /// Wait until everything injected so far has been processed
    async fn flush(&mut self) {
        self.transport
            .inject(ONOFF_SRV, MsgContext::received(PEER, LOCAL), ONOFF_SET_UNACK, &[]);
        loop {
            if let Seen::Operation(message) = self.next().await {
                if message.opcode == ONOFF_SET_UNACK {
                    return;
                }
            }
        }
    }

    async fn expect_send_complete(&mut self) -> SendComplete {
        match self.next().await {
            Seen::SendComplete(complete) => complete,
            other => panic!("expected SendComplete, got {:?}", other),
        }
    }
}

fn get(dst: Address) -> Request<'static> {
    Request::new(MsgContext::to(dst), ONOFF_GET, &[])
}

// ============================================================================
// Request / status correlation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_status_completes_request_exactly_once() {
    let mut h = Harness::start(StackConfig::default(), onoff_peer());

    h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap();

    let complete = h.expect_send_complete().await;
    assert_eq!(complete.result, Ok(()));
    assert_eq!(complete.ctx.addr, PEER);

    match h.next().await {
        Seen::Matched(request, message) => {
            assert_eq!(request, ONOFF_GET);
            assert_eq!(message.opcode, ONOFF_STATUS);
            assert_eq!(message.payload, vec![0x01]);
            assert_eq!(message.ctx.addr, PEER);
            assert!(!message.degraded);
        }
        other => panic!("expected Matched, got {:?}", other),
    }

    // well past the default timeout: the cancelled timer must stay silent
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.seen.try_recv().is_err());

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.requests_sent, 1);
    assert_eq!(stats.matched, 1);
    assert_eq!(stats.timeouts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_late_status_is_unsolicited() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());
    let start = tokio::time::Instant::now();

    let req = get(PEER).with_timeout(Duration::from_secs(2));
    h.handle.send_request(ONOFF_CLI, &req).await.unwrap();
    h.expect_send_complete().await;

    match h.next().await {
        Seen::Timeout(notice) => {
            assert_eq!(notice.model, ONOFF_CLI);
            assert_eq!(notice.opcode, ONOFF_GET);
            assert_eq!(notice.ctx.addr, PEER);
        }
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert!(start.elapsed() >= Duration::from_secs(2));

    h.transport
        .inject(ONOFF_CLI, MsgContext::received(PEER, LOCAL), ONOFF_STATUS, &[0x00]);
    match h.next().await {
        Seen::Unsolicited(message) => assert_eq!(message.opcode, ONOFF_STATUS),
        other => panic!("expected Unsolicited, got {:?}", other),
    }

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.matched, 0);
    assert_eq!(stats.unsolicited, 1);
}

#[tokio::test(start_paused = true)]
async fn test_configured_default_timeout_applies() {
    let config = StackConfigBuilder::new()
        .default_timeout(Duration::from_secs(1))
        .build();
    let mut h = Harness::start(config, MockTransport::new());
    let start = tokio::time::Instant::now();

    h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap();
    h.expect_send_complete().await;

    assert!(matches!(h.next().await, Seen::Timeout(_)));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_uncopyable_status_leaves_request_to_time_out() {
    let config = StackConfigBuilder::new().max_field_len(2).build();
    let mut h = Harness::start(config, MockTransport::new());

    h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap();
    h.expect_send_complete().await;

    h.transport.inject(
        ONOFF_CLI,
        MsgContext::received(PEER, LOCAL),
        ONOFF_STATUS,
        &[0x01, 0x02, 0x03, 0x04],
    );
    h.flush().await;

    // the status was dropped before matching, so the request is still outstanding
    let err = h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap_err();
    assert_eq!(err, MeshError::Busy { dst: PEER });
    assert_eq!(
        h.expect_send_complete().await.result,
        Err(MeshError::Busy { dst: PEER })
    );

    match h.next().await {
        Seen::Timeout(notice) => assert_eq!(notice.ctx.addr, PEER),
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert!(h.seen.try_recv().is_err());

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.copy_failures, 1);
    assert_eq!(stats.matched, 0);
    assert_eq!(stats.timeouts, 1);

    h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_group_addressed_status_does_not_complete() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap();
    h.expect_send_complete().await;

    h.transport.inject(
        ONOFF_CLI,
        MsgContext::received(PEER, Address::new(0xC001)),
        ONOFF_STATUS,
        &[0x01],
    );
    match h.next().await {
        Seen::Unsolicited(message) => assert_eq!(message.ctx.recv_dst, Address::new(0xC001)),
        other => panic!("expected Unsolicited, got {:?}", other),
    }

    // still outstanding
    let err = h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap_err();
    assert_eq!(err, MeshError::Busy { dst: PEER });
}

// ============================================================================
// One outstanding request per destination
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_busy_while_outstanding() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap();
    let err = h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap_err();
    assert_eq!(err, MeshError::Busy { dst: PEER });

    // a different destination is independent
    h.handle.send_request(ONOFF_CLI, &get(OTHER_PEER)).await.unwrap();

    h.expect_send_complete().await;
    let refused = h.expect_send_complete().await;
    assert_eq!(refused.result, Err(MeshError::Busy { dst: PEER }));

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.requests_sent, 2);
    assert_eq!(stats.busy, 1);
    assert_eq!(h.transport.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_destination_free_after_match() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap();
    h.expect_send_complete().await;

    h.transport
        .inject(ONOFF_CLI, MsgContext::received(PEER, LOCAL), ONOFF_STATUS, &[0x01]);
    assert!(matches!(h.next().await, Seen::Matched(ONOFF_GET, _)));

    h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_sends_are_untracked() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    let set = Request::unacknowledged(MsgContext::to(PEER), ONOFF_SET_UNACK, &[0x01, 0x00]);
    h.handle.send_request(ONOFF_CLI, &set).await.unwrap();
    h.handle.send_request(ONOFF_CLI, &set).await.unwrap();
    h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap();

    for _ in 0..3 {
        assert_eq!(h.expect_send_complete().await.result, Ok(()));
    }
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_frees_destination() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    h.transport
        .fail_next_send(MeshError::TransportFailure("no buffers".to_string()));
    let err = h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap_err();
    assert!(matches!(err, MeshError::TransportFailure(_)));

    h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap();

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.transport_failures, 1);
    assert_eq!(stats.requests_sent, 1);

    // the failed send never produces a timeout
    assert!(matches!(h.next().await, Seen::SendComplete(_)));
    assert!(matches!(h.next().await, Seen::SendComplete(_)));
    assert!(matches!(h.next().await, Seen::Timeout(_)));
    assert!(h.seen.try_recv().is_err());
}

// ============================================================================
// Roles
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_role_applies_to_one_send() {
    let h = Harness::start(StackConfig::default(), MockTransport::new());

    h.handle
        .send_request_as(ONOFF_CLI, &get(PEER), Role::Provisioner)
        .await
        .unwrap();
    h.handle.send_request(ONOFF_CLI, &get(OTHER_PEER)).await.unwrap();

    let sent = h.transport.sent();
    assert_eq!(sent[0].ctx.role, Role::Provisioner);
    assert_eq!(sent[1].ctx.role, Role::Node);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_role_is_rejected() {
    let h = Harness::start(StackConfig::default(), MockTransport::new());

    let err = h
        .handle
        .set_role(ONOFF_CLI, Role::FastProvisioner)
        .await
        .unwrap_err();
    assert!(matches!(err, MeshError::InvalidArgument(_)));

    let err = h
        .handle
        .send_request_as(ONOFF_CLI, &get(PEER), Role::FastProvisioner)
        .await
        .unwrap_err();
    assert!(matches!(err, MeshError::InvalidArgument(_)));
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn test_role_on_server_model_is_unsupported() {
    let h = Harness::start(StackConfig::default(), MockTransport::new());
    let err = h
        .handle
        .set_role(ONOFF_SRV, Role::Provisioner)
        .await
        .unwrap_err();
    assert!(matches!(err, MeshError::Unsupported(_)));
}

// ============================================================================
// Server models and publication
// ============================================================================

#[tokio::test]
async fn test_server_operation_and_response() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    h.transport
        .inject(ONOFF_SRV, MsgContext::received(PEER, LOCAL), ONOFF_GET, &[]);
    let request = match h.next().await {
        Seen::Operation(message) => message,
        other => panic!("expected Operation, got {:?}", other),
    };
    assert_eq!(request.opcode, ONOFF_GET);

    h.handle
        .server_send(ONOFF_SRV, MsgContext::to(request.ctx.addr), ONOFF_STATUS, &[0x00])
        .await
        .unwrap();
    match h.next().await {
        Seen::ServerSendComplete(complete) => {
            assert_eq!(complete.opcode, ONOFF_STATUS);
            assert_eq!(complete.result, Ok(()));
        }
        other => panic!("expected ServerSendComplete, got {:?}", other),
    }

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ctx.addr, PEER);
    assert_eq!(sent[0].payload, vec![0x00]);
}

#[tokio::test]
async fn test_publish() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    h.handle
        .publish(ONOFF_SRV, ONOFF_STATUS, &[0x01], Role::Node)
        .await
        .unwrap();
    assert_eq!(
        h.next().await,
        Seen::PublishComplete(ONOFF_SRV, ONOFF_STATUS, Ok(()))
    );
    assert_eq!(
        h.transport.published(),
        vec![(ONOFF_SRV, Role::Node, ONOFF_STATUS)]
    );

    let err = h
        .handle
        .publish(ONOFF_SRV, ONOFF_STATUS, &[0x01], Role::FastProvisioner)
        .await
        .unwrap_err();
    assert!(matches!(err, MeshError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_unknown_model() {
    let h = Harness::start(StackConfig::default(), MockTransport::new());
    let err = h
        .handle
        .send_request(ModelId::new(3, 0), &get(PEER))
        .await
        .unwrap_err();
    assert!(matches!(err, MeshError::UnknownModel { element: 3, index: 0 }));
}

// ============================================================================
// Event delivery
// ============================================================================

#[tokio::test]
async fn test_unregistered_subsystem_is_skipped() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    h.transport
        .inject(SENSOR_CLI, MsgContext::received(PEER, LOCAL), Opcode::one(0x52), &[0x00]);
    h.flush().await;

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.unsolicited, 1);
    assert_eq!(stats.events_skipped, 1);
    assert!(h.seen.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_full_event_queue_holds_terminal_events() {
    let config = StackConfigBuilder::new().event_queue_size(1).build();
    let (mut h, release) = Harness::start_stalled(config, MockTransport::new());

    let req = get(PEER).with_timeout(Duration::from_secs(1));
    h.handle.send_request(ONOFF_CLI, &req).await.unwrap();
    // the queue is now full; this completion has nowhere to go
    let req = get(OTHER_PEER).with_timeout(Duration::from_secs(1));
    h.handle.send_request(ONOFF_CLI, &req).await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.timeouts, 2);
    assert_eq!(stats.events_posted, 1);
    assert_eq!(stats.events_backlogged, 2);
    assert_eq!(stats.event_dispatch_failures, 1);

    // while timeouts wait, other events yield to them
    h.handle
        .publish(ONOFF_SRV, ONOFF_STATUS, &[0x01], Role::Node)
        .await
        .unwrap();

    release.send(()).unwrap();
    let complete = h.expect_send_complete().await;
    assert_eq!(complete.ctx.addr, PEER);

    let mut timed_out = Vec::new();
    for _ in 0..2 {
        match h.next().await {
            Seen::Timeout(notice) => timed_out.push(notice.ctx.addr),
            other => panic!("expected Timeout, got {:?}", other),
        }
    }
    timed_out.sort();
    assert_eq!(timed_out, vec![PEER, OTHER_PEER]);

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.events_posted, 3);
    assert_eq!(stats.event_dispatch_failures, 2);
    assert!(h.seen.try_recv().is_err());

    // drained: ordinary events flow again
    h.handle
        .publish(ONOFF_SRV, ONOFF_STATUS, &[0x01], Role::Node)
        .await
        .unwrap();
    assert!(matches!(h.next().await, Seen::PublishComplete(..)));
}

#[tokio::test]
async fn test_inbound_payload_copied_into_event() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    let payload: Vec<u8> = (0..=255u8).collect();
    h.transport
        .inject(ONOFF_SRV, MsgContext::received(PEER, LOCAL), ONOFF_SET, &payload);
    match h.next().await {
        Seen::Operation(message) => {
            assert_eq!(message.payload, payload);
            assert!(!message.degraded);
        }
        other => panic!("expected Operation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_degrade_policy_marks_events() {
    let config = StackConfigBuilder::new()
        .copy_policy(CopyPolicy::Degrade)
        .max_field_len(2)
        .build();
    let mut h = Harness::start(config, MockTransport::new());

    h.transport
        .inject(ONOFF_SRV, MsgContext::received(PEER, LOCAL), ONOFF_SET, &[1, 2, 3, 4]);
    match h.next().await {
        Seen::Operation(message) => {
            assert!(message.degraded);
            assert!(message.payload.is_empty());
            assert_eq!(message.opcode, ONOFF_SET);
        }
        other => panic!("expected Operation, got {:?}", other),
    }

    // requests are never sent with an emptied payload
    let set = Request::new(MsgContext::to(PEER), ONOFF_SET, &[1, 2, 3, 4]);
    let err = h.handle.send_request(ONOFF_CLI, &set).await.unwrap_err();
    assert!(matches!(err, MeshError::AllocationFailure { .. }));

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.degraded_copies, 1);
}

#[tokio::test]
async fn test_reject_policy_drops_oversized_events() {
    let config = StackConfigBuilder::new().max_field_len(2).build();
    let mut h = Harness::start(config, MockTransport::new());

    h.transport
        .inject(ONOFF_SRV, MsgContext::received(PEER, LOCAL), ONOFF_SET, &[1, 2, 3, 4]);
    h.flush().await;

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.copy_failures, 1);
    assert_eq!(stats.operations, 2);
    assert!(h.seen.try_recv().is_err());
}

// ============================================================================
// Provisioning
// ============================================================================

#[tokio::test]
async fn test_prov_call_copies_caller_buffers() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    let mut addrs = vec![Address::new(0x0005), Address::new(0xC000)];
    h.handle.proxy_add_filter_addr(0, &addrs).unwrap();
    addrs.clear();
    drop(addrs);

    let mut comp_data = vec![0x02, 0x00, 0x01, 0x00];
    h.handle
        .store_node_comp_data(Address::new(0x0005), &comp_data)
        .unwrap();
    comp_data.fill(0xFF);

    assert_eq!(
        h.next().await,
        Seen::Prov(ProvEvent::CallComplete {
            action: ProvAction::ProxyAddFilterAddr,
            result: Ok(()),
        })
    );
    assert!(matches!(h.next().await, Seen::Prov(ProvEvent::CallComplete { .. })));

    assert_eq!(
        h.transport.prov_calls(),
        vec![
            ProvCall::ProxyAddFilterAddr {
                net_idx: 0,
                addrs: vec![Address::new(0x0005), Address::new(0xC000)],
            },
            ProvCall::StoreNodeCompData {
                unicast: Address::new(0x0005),
                data: vec![0x02, 0x00, 0x01, 0x00],
            },
        ]
    );
}

#[tokio::test]
async fn test_prov_events_forwarded() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    let beacon = ProvEvent::UnprovisionedBeacon {
        uuid: Uuid::from_u128(0xdead_beef),
        bd_addr: [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
        oob_info: 0,
        rssi: -60,
        adv_data: vec![0x02, 0x01, 0x06],
    };
    h.transport.inject_prov(ProvEvent::LinkOpen { bearer: Bearer::Adv });
    h.transport.inject_prov(beacon.clone());

    assert_eq!(
        h.next().await,
        Seen::Prov(ProvEvent::LinkOpen { bearer: Bearer::Adv })
    );
    assert_eq!(h.next().await, Seen::Prov(beacon));

    let stats = h.handle.stats().await.unwrap();
    assert_eq!(stats.prov_events, 2);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_drops_outstanding_without_events() {
    let mut h = Harness::start(StackConfig::default(), MockTransport::new());

    h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap();
    h.handle.shutdown().await.unwrap();

    h.stack.await.unwrap().unwrap();
    let delivered = h.delivery.await.unwrap();
    assert_eq!(delivered, 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let mut remaining = Vec::new();
    while let Some(seen) = h.seen.recv().await {
        remaining.push(seen);
    }
    assert_eq!(remaining.len(), 1);
    assert!(matches!(remaining[0], Seen::SendComplete(_)));

    let err = h.handle.send_request(ONOFF_CLI, &get(PEER)).await.unwrap_err();
    assert!(matches!(err, MeshError::DispatchFailed(_)));
}
