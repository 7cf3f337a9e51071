// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! The serving side: accepts inbound streams on the worker's listening
//! port.
//!
//! A stream without `source_id` metadata comes from the function proxy; at
//! most one may be active and its first attach releases the start-up latch.
//! A stream with `source_id` is a direct peer stream and must name this
//! instance in `dst_id`. When a stream ends, a per-remote disconnect timer
//! starts; re-attach cancels it, expiry fires the broker's disconnect
//! callback.

use crate::codes::ErrorInfo;
use crate::registry::StreamRegistry;
use crate::security::Security;
use crate::stream::{Dispatcher, FrameSink, FrameSource, PeerCallback, StreamRw};
use fnbus_config::FUNCTION_PROXY;
use fnbus_proto::proto::fnbus::v1::fn_bus_server::{FnBus, FnBusServer};
use fnbus_proto::proto::fnbus::v1::{BatchStreamMsg, StreamMsg};
use fnbus_proto::ErrorCode;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, info, warn};

const STREAM_CHANNEL_CAP: usize = 64;

/// Configuration handed to [`BusService::start`].
pub struct ServiceOptions {
    /// This worker's instance id; inbound `dst_id` must match.
    pub instance_id: String,
    /// This worker's runtime id.
    pub runtime_id: String,
    /// Listen address.
    pub listen_ip: String,
    /// Listen port; 0 picks an unused one.
    pub listen_port: u16,
    /// Per-envelope size cap.
    pub max_msg_bytes: usize,
    /// Grace window for proxy re-attach.
    pub proxy_disconnect_timeout: Duration,
    /// Grace window for direct peer re-attach.
    pub peer_disconnect_timeout: Duration,
    /// TLS material for the serving port.
    pub security: Option<Security>,
    /// Handler table for the proxy stream.
    pub proxy_dispatcher: Dispatcher,
    /// Handler table for direct peer streams.
    pub direct_dispatcher: Dispatcher,
    /// Fired with the remote id on every stream attach.
    pub resend_cb: PeerCallback,
    /// Fired with the remote id when a disconnect timer expires.
    pub disconnected_cb: PeerCallback,
}

/// The worker's gRPC serving side.
pub struct BusService {
    inner: Arc<ServiceInner>,
    listen_port: u16,
    shutdown_tx: watch::Sender<bool>,
}

struct ServiceInner {
    instance_id: String,
    runtime_id: String,
    max_msg_bytes: usize,
    proxy_disconnect_timeout: Duration,
    peer_disconnect_timeout: Duration,
    registry: Arc<StreamRegistry>,
    proxy_dispatcher: Dispatcher,
    direct_dispatcher: Dispatcher,
    resend_cb: PeerCallback,
    disconnected_cb: PeerCallback,
    proxy_connected: AtomicBool,
    attach_latch: watch::Sender<bool>,
    disconnect_timers: Mutex<HashMap<String, AbortHandle>>,
    stopped: AtomicBool,
}

impl BusService {
    /// Binds the listening port and starts serving streams.
    pub async fn start(
        opts: ServiceOptions,
        registry: Arc<StreamRegistry>,
    ) -> Result<Self, ErrorInfo> {
        let addr: SocketAddr = format!("{}:{}", opts.listen_ip, opts.listen_port)
            .parse()
            .map_err(|e| {
                ErrorInfo::new(
                    ErrorCode::ErrInitConnectionFailed,
                    format!("invalid listen address {}:{}: {e}", opts.listen_ip, opts.listen_port),
                )
            })?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("failed to bind serving port {addr}: {e}");
            ErrorInfo::new(
                ErrorCode::ErrInitConnectionFailed,
                format!("failed to start bus server on {addr}"),
            )
        })?;
        let listen_port = listener
            .local_addr()
            .map_err(|e| {
                ErrorInfo::new(
                    ErrorCode::ErrInitConnectionFailed,
                    format!("failed to read serving port: {e}"),
                )
            })?
            .port();

        let inner = Arc::new(ServiceInner {
            instance_id: opts.instance_id,
            runtime_id: opts.runtime_id,
            max_msg_bytes: opts.max_msg_bytes,
            proxy_disconnect_timeout: opts.proxy_disconnect_timeout,
            peer_disconnect_timeout: opts.peer_disconnect_timeout,
            registry,
            proxy_dispatcher: opts.proxy_dispatcher,
            direct_dispatcher: opts.direct_dispatcher,
            resend_cb: opts.resend_cb,
            disconnected_cb: opts.disconnected_cb,
            proxy_connected: AtomicBool::new(false),
            attach_latch: watch::channel(false).0,
            disconnect_timers: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        });

        let service = FnBusServer::new(GrpcFacade(Arc::clone(&inner)))
            .max_decoding_message_size(opts.max_msg_bytes)
            .max_encoding_message_size(opts.max_msg_bytes);
        let mut builder = Server::builder();
        if let Some(tls) = opts.security.as_ref().and_then(Security::server_tls) {
            builder = builder.tls_config(tls).map_err(|e| {
                ErrorInfo::new(
                    ErrorCode::ErrInitConnectionFailed,
                    format!("invalid serving tls material: {e}"),
                )
            })?;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let incoming = TcpListenerStream::new(listener);
        let _ = tokio::spawn(async move {
            let serve = builder
                .add_service(service)
                .serve_with_incoming_shutdown(incoming, async move {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                });
            if let Err(e) = serve.await {
                error!("bus server terminated: {e}");
            }
        });
        info!("bus service listening on {}:{listen_port}", addr.ip());
        Ok(BusService {
            inner,
            listen_port,
            shutdown_tx,
        })
    }

    /// The bound serving port.
    #[must_use]
    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// Waits for the first proxy stream to attach.
    pub async fn wait_attached(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.attach_latch.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|attached| *attached))
            .await
            .is_ok()
    }

    /// Stops serving: refuses new streams, cancels disconnect timers and
    /// shuts the listener down.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(
            "stopping bus service of {} on port {}",
            self.inner.instance_id, self.listen_port
        );
        let timers: Vec<AbortHandle> = {
            let mut map = self.inner.disconnect_timers.lock();
            map.drain().map(|(_, handle)| handle).collect()
        };
        for timer in timers {
            timer.abort();
        }
        let _ = self.shutdown_tx.send_replace(true);
    }
}

struct GrpcFacade(Arc<ServiceInner>);

#[tonic::async_trait]
impl FnBus for GrpcFacade {
    type MsgStreamStream = ReceiverStream<Result<StreamMsg, Status>>;

    async fn msg_stream(
        &self,
        request: Request<Streaming<StreamMsg>>,
    ) -> Result<Response<Self::MsgStreamStream>, Status> {
        let inner = &self.0;
        if inner.stopped.load(Ordering::Acquire) {
            return Err(Status::unavailable("service was already closed"));
        }
        let source_id = metadata_str(&request, "source_id");
        match source_id {
            None => inner.attach_proxy(request),
            Some(source) => {
                let dst = metadata_str(&request, "dst_id").unwrap_or_default();
                let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAP);
                inner.attach_direct(
                    source,
                    dst,
                    FrameSink::Server(tx),
                    FrameSource::Single(request.into_inner()),
                )?;
                Ok(Response::new(ReceiverStream::new(rx)))
            }
        }
    }

    type BatchMsgStreamStream = ReceiverStream<Result<BatchStreamMsg, Status>>;

    async fn batch_msg_stream(
        &self,
        request: Request<Streaming<BatchStreamMsg>>,
    ) -> Result<Response<Self::BatchMsgStreamStream>, Status> {
        let inner = &self.0;
        if inner.stopped.load(Ordering::Acquire) {
            return Err(Status::unavailable("service was already closed"));
        }
        let Some(source) = metadata_str(&request, "source_id") else {
            return Err(Status::invalid_argument("The instance id is not match."));
        };
        let dst = metadata_str(&request, "dst_id").unwrap_or_default();
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAP);
        inner.attach_direct(
            source,
            dst,
            FrameSink::ServerBatch(tx),
            FrameSource::Batch(request.into_inner()),
        )?;
        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

impl ServiceInner {
    /// Accepts the proxy stream: validates the instance id, enforces the
    /// single-stream rule and releases the start-up latch.
    fn attach_proxy(
        self: &Arc<Self>,
        request: Request<Streaming<StreamMsg>>,
    ) -> Result<Response<ReceiverStream<Result<StreamMsg, Status>>>, Status> {
        if !self.instance_id_matches(&request) {
            return Err(Status::invalid_argument("The instance id is not match."));
        }
        if let Some(proxy) = self.registry.proxy() {
            if proxy.available() {
                error!("a proxy stream is already connected, rejecting the new one");
                return Err(Status::already_exists(
                    "The runtime has already connected to the function system",
                ));
            }
        }
        if self.proxy_connected.swap(true, Ordering::AcqRel) {
            error!("a proxy stream is already connecting, rejecting the new one");
            return Err(Status::already_exists(
                "The runtime has already connected to the function system",
            ));
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAP);
        let (stream, done) = StreamRw::serve(
            self.instance_id.clone(),
            FUNCTION_PROXY.to_owned(),
            self.runtime_id.clone(),
            self.max_msg_bytes,
            FrameSink::Server(tx),
            FrameSource::Single(request.into_inner()),
            Arc::clone(&self.proxy_dispatcher),
        );
        self.registry.update_proxy(stream);
        let _ = self.attach_latch.send_replace(true);
        self.on_attach(FUNCTION_PROXY);

        let monitor = Arc::clone(self);
        let _ = tokio::spawn(async move {
            let _ = done.await;
            monitor.proxy_connected.store(false, Ordering::Release);
            monitor.on_detach(FUNCTION_PROXY, monitor.proxy_disconnect_timeout);
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    /// Accepts a direct peer stream after checking `dst_id` and the
    /// one-stream-per-peer rule.
    fn attach_direct(
        self: &Arc<Self>,
        source: String,
        dst: String,
        sink: FrameSink,
        frames: FrameSource,
    ) -> Result<(), Status> {
        if dst != self.instance_id {
            error!(
                "failed to build stream from {source}, instance id is not match. remote expected:{dst} actual:{}",
                self.instance_id
            );
            return Err(Status::invalid_argument("The instance id is not match."));
        }
        if let Some(existing) = self.registry.try_get(&source) {
            if existing.available() {
                return Err(Status::already_exists(format!(
                    "The runtime {} has already connected to the {source}",
                    self.instance_id
                )));
            }
        }

        let (stream, done) = StreamRw::serve(
            self.instance_id.clone(),
            source.clone(),
            self.runtime_id.clone(),
            self.max_msg_bytes,
            sink,
            frames,
            Arc::clone(&self.direct_dispatcher),
        );
        if !self.registry.emplace(&source, stream) {
            return Err(Status::already_exists(format!(
                "The runtime {} has already connected to the {source}",
                self.instance_id
            )));
        }
        self.on_attach(&source);

        let monitor = Arc::clone(self);
        let _ = tokio::spawn(async move {
            let _ = done.await;
            monitor.on_detach(&source, monitor.peer_disconnect_timeout);
        });
        Ok(())
    }

    /// A proxy stream carrying no instance id, or one from a driver, is
    /// accepted; anything else has to name this instance.
    fn instance_id_matches<T>(&self, request: &Request<T>) -> bool {
        let Some(claimed) = metadata_str(request, "instance_id") else {
            warn!("no instance_id in stream metadata");
            return true;
        };
        if claimed.starts_with("driver") {
            debug!("driver mode: {claimed}");
            return true;
        }
        if claimed == self.instance_id {
            return true;
        }
        warn!(
            "instance id not match, expect: {} got: {claimed}",
            self.instance_id
        );
        false
    }

    fn on_attach(&self, remote: &str) {
        self.stop_disconnect_timer(remote);
        (self.resend_cb)(remote);
    }

    fn on_detach(self: &Arc<Self>, remote: &str, timeout: Duration) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        debug!("stream from {remote} ended, arming disconnect timer");
        let weak = Arc::downgrade(self);
        let timer_remote = remote.to_owned();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                (inner.disconnected_cb)(&timer_remote);
            }
        })
        .abort_handle();
        let replaced = self
            .disconnect_timers
            .lock()
            .insert(remote.to_owned(), handle);
        if let Some(old) = replaced {
            old.abort();
        }
    }

    fn stop_disconnect_timer(&self, remote: &str) {
        if let Some(timer) = self.disconnect_timers.lock().remove(remote) {
            timer.abort();
        }
    }
}

fn metadata_str<T>(request: &Request<T>, key: &str) -> Option<String> {
    request
        .metadata()
        .get(key)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
