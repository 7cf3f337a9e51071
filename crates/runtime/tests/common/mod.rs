// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Test doubles for the function proxy and for peer workers: a real gRPC
//! server whose streams are scripted through channels.

#![allow(dead_code)]

use fnbus_config::BusConfig;
use fnbus_proto::MsgKind;
use fnbus_proto::proto::fnbus::v1::bus_gateway_server::{BusGateway, BusGatewayServer};
use fnbus_proto::proto::fnbus::v1::fn_bus_server::{FnBus, FnBusServer};
use fnbus_proto::proto::fnbus::v1::{
    BatchStreamMsg, CallReq, CheckpointReq, CheckpointRsp, DiscoverDriverRequest,
    DiscoverDriverResponse, RecoverReq, RecoverRsp, ShutdownReq, ShutdownRsp, SignalReq,
    SignalRsp, StreamMsg,
};
use fnbus_runtime::dispatch::Handlers;
use fnbus_runtime::{BusClient, BusClientOptions, ClientMode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

const WAIT: Duration = Duration::from_secs(10);

/// Outbound half of a stream a worker opened against the mock.
pub enum WorkerTx {
    Single(mpsc::Sender<Result<StreamMsg, Status>>),
    Batch(mpsc::Sender<Result<BatchStreamMsg, Status>>),
}

impl WorkerTx {
    /// Injects one envelope towards the worker.
    pub async fn send(&self, msg: StreamMsg) {
        match self {
            WorkerTx::Single(tx) => {
                tx.send(Ok(msg)).await.expect("worker stream closed");
            }
            WorkerTx::Batch(tx) => {
                tx.send(Ok(BatchStreamMsg { msgs: vec![msg] }))
                    .await
                    .expect("worker stream closed");
            }
        }
    }
}

#[derive(Clone)]
struct MockBus {
    inbound: mpsc::UnboundedSender<StreamMsg>,
    frames: mpsc::UnboundedSender<BatchStreamMsg>,
    attaches: mpsc::UnboundedSender<WorkerTx>,
    discoveries: mpsc::UnboundedSender<DiscoverDriverRequest>,
}

#[tonic::async_trait]
impl FnBus for MockBus {
    type MsgStreamStream = ReceiverStream<Result<StreamMsg, Status>>;

    async fn msg_stream(
        &self,
        request: Request<Streaming<StreamMsg>>,
    ) -> Result<Response<Self::MsgStreamStream>, Status> {
        let (tx, rx) = mpsc::channel(64);
        let _ = self.attaches.send(WorkerTx::Single(tx));
        let mut stream = request.into_inner();
        let inbound = self.inbound.clone();
        let _ = tokio::spawn(async move {
            while let Ok(Some(msg)) = stream.message().await {
                if inbound.send(msg).is_err() {
                    break;
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type BatchMsgStreamStream = ReceiverStream<Result<BatchStreamMsg, Status>>;

    async fn batch_msg_stream(
        &self,
        request: Request<Streaming<BatchStreamMsg>>,
    ) -> Result<Response<Self::BatchMsgStreamStream>, Status> {
        let (tx, rx) = mpsc::channel(64);
        let _ = self.attaches.send(WorkerTx::Batch(tx));
        let mut stream = request.into_inner();
        let inbound = self.inbound.clone();
        let frames = self.frames.clone();
        let _ = tokio::spawn(async move {
            while let Ok(Some(batch)) = stream.message().await {
                let _ = frames.send(batch.clone());
                for msg in batch.msgs {
                    if inbound.send(msg).is_err() {
                        return;
                    }
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

#[tonic::async_trait]
impl BusGateway for MockBus {
    async fn discover_driver(
        &self,
        request: Request<DiscoverDriverRequest>,
    ) -> Result<Response<DiscoverDriverResponse>, Status> {
        let _ = self.discoveries.send(request.into_inner());
        Ok(Response::new(DiscoverDriverResponse {
            node_id: "node-17".to_owned(),
            host_ip: "10.1.2.3".to_owned(),
            server_version: "1.9.0".to_owned(),
        }))
    }
}

/// One scripted bus endpoint plus the channels observing it.
pub struct MockBusHandle {
    pub port: u16,
    pub inbound: mpsc::UnboundedReceiver<StreamMsg>,
    pub frames: mpsc::UnboundedReceiver<BatchStreamMsg>,
    pub attaches: mpsc::UnboundedReceiver<WorkerTx>,
    pub discoveries: mpsc::UnboundedReceiver<DiscoverDriverRequest>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockBusHandle {
    /// Waits for the next stream a worker opens against the mock.
    pub async fn next_attach(&mut self) -> WorkerTx {
        timeout(WAIT, self.attaches.recv())
            .await
            .expect("timed out waiting for a stream attach")
            .expect("mock server gone")
    }

    /// Waits for the next inbound envelope of the given kind, skipping
    /// others.
    pub async fn expect_msg(&mut self, kind: MsgKind) -> StreamMsg {
        loop {
            let msg = timeout(WAIT, self.inbound.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {kind:?}"))
                .expect("mock server gone");
            if msg.kind() == Some(kind) {
                return msg;
            }
        }
    }

    /// Asserts that no envelope of the given kind arrives within `window`.
    pub async fn expect_absent(&mut self, kind: MsgKind, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.inbound.recv()).await {
                Err(_) => return,
                Ok(Some(msg)) => {
                    assert_ne!(msg.kind(), Some(kind), "unexpected {kind:?} arrived");
                }
                Ok(None) => return,
            }
        }
    }

    /// Tears the mock server down; workers observe a dead endpoint.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Boots a scripted bus endpoint on an unused port.
pub async fn start_mock_bus() -> MockBusHandle {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (attach_tx, attach_rx) = mpsc::unbounded_channel();
    let (discover_tx, discover_rx) = mpsc::unbounded_channel();
    let mock = MockBus {
        inbound: inbound_tx,
        frames: frames_tx,
        attaches: attach_tx,
        discoveries: discover_tx,
    };

    let port = portpicker::pick_unused_port().expect("no free ports");
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let listener = TcpListener::bind(addr).await.expect("bind mock bus");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let _ = tokio::spawn(async move {
        Server::builder()
            .add_service(FnBusServer::new(mock.clone()))
            .add_service(BusGatewayServer::new(mock))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("mock bus server failed");
    });
    MockBusHandle {
        port,
        inbound: inbound_rx,
        frames: frames_rx,
        attaches: attach_rx,
        discoveries: discover_rx,
        shutdown: Some(shutdown_tx),
    }
}

/// Handlers that count invocations and ack everything.
#[derive(Default)]
pub struct RecordingHandlers {
    pub inits: AtomicUsize,
    pub calls: AtomicUsize,
    pub signals: AtomicUsize,
}

#[async_trait::async_trait]
impl Handlers for RecordingHandlers {
    async fn init(&self, _call: CallReq) {
        let _ = self.inits.fetch_add(1, Ordering::SeqCst);
    }
    async fn call(&self, _call: CallReq) {
        let _ = self.calls.fetch_add(1, Ordering::SeqCst);
    }
    async fn checkpoint(&self, _req: CheckpointReq) -> CheckpointRsp {
        CheckpointRsp::default()
    }
    async fn recover(&self, _req: RecoverReq) -> RecoverRsp {
        RecoverRsp::default()
    }
    async fn shutdown(&self, _req: ShutdownReq) -> ShutdownRsp {
        ShutdownRsp::default()
    }
    async fn signal(&self, _req: SignalReq) -> SignalRsp {
        let _ = self.signals.fetch_add(1, Ordering::SeqCst);
        SignalRsp::default()
    }
}

/// A config tuned for fast test retries.
pub fn fast_config() -> BusConfig {
    let mut cfg = BusConfig::default();
    cfg.request_ack_timeout_sec = 1;
    cfg.request_ack_acc_max_sec = 30;
    cfg
}

/// Starts a worker in cloud-client mode against the mock proxy.
pub async fn start_worker(
    cfg: BusConfig,
    proxy_port: u16,
    handlers: Arc<dyn Handlers>,
    resubscribe: Option<Arc<dyn Fn() + Send + Sync>>,
) -> BusClient {
    BusClient::start(
        cfg,
        BusClientOptions {
            mode: ClientMode::CloudClient,
            proxy_ip: "127.0.0.1".to_owned(),
            proxy_port,
            listen_ip: String::new(),
            listen_port: 0,
            job_id: "job-1".to_owned(),
            instance_id: "worker-1".to_owned(),
            runtime_id: "rt-1".to_owned(),
            function_name: "echo".to_owned(),
            handlers,
            security: None,
            resubscribe,
        },
    )
    .await
    .expect("worker failed to start")
}

/// Counter wired as the resubscribe hook.
pub fn counting_hook() -> (Arc<AtomicUsize>, Arc<dyn Fn() + Send + Sync>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let hooked = Arc::clone(&counter);
    let hook: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
        let _ = hooked.fetch_add(1, Ordering::SeqCst);
    });
    (counter, hook)
}
