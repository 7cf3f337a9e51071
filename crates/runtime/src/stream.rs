// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! One logical bidirectional message stream.
//!
//! A [`StreamRw`] owns a FIFO send queue drained by a single writer and a
//! single reader delivering inbound envelopes to a dispatcher, so messages on
//! one stream stay ordered while handlers run elsewhere. The client role adds
//! a reconnect loop; the server role terminates when the peer goes away and
//! leaves the grace timing to the service.

use crate::codes::ErrorInfo;
use crate::pool::ConnectionPool;
use crate::security::Security;
use fnbus_config::FUNCTION_PROXY;
use fnbus_proto::proto::fnbus::v1::fn_bus_client::FnBusClient;
use fnbus_proto::proto::fnbus::v1::{
    BatchStreamMsg, CallReq, CallResultAck, ErrorCode, InvokeRsp, NotifyReq, StreamMsg,
    stream_msg::Body,
};
use futures::future::BoxFuture;
use prost::Message;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Status, Streaming};
use tracing::{debug, info, warn};

const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);
const START_RETRY_TIMES: usize = 3;
const FRAME_CHANNEL_CAP: usize = 64;

/// Fired once per message after the transport accepted (or refused) the
/// frame carrying it. The `bool` is the direct/proxy decision.
pub type AckFn = Box<dyn FnOnce(bool, Result<(), ErrorInfo>) + Send>;

/// Observes the direct/proxy decision synchronously before the attempt.
pub type PrewriteFn = Box<dyn FnOnce(bool) + Send>;

/// Delivers an inbound envelope; the `&str` names the sending peer.
pub type Dispatcher = Arc<dyn Fn(&str, StreamMsg) + Send + Sync>;

/// Callback keyed by peer id (resend-on-reconnect, disconnected).
pub type PeerCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Re-handshake hook invoked when the transport reports lost authorization.
pub type DiscoverCb = Arc<dyn Fn() -> BoxFuture<'static, Result<(), ErrorInfo>> + Send + Sync>;

/// Observable stream lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No transport yet.
    Unconnected,
    /// Transport being (re)built.
    Connecting,
    /// Live.
    Connected,
    /// Transport lost, reconnect or teardown pending.
    Disconnecting,
    /// Terminal failure; writes are refused forever.
    Abnormal,
}

/// Where a stream's driver terminated, as seen by the reconnect loop.
enum PumpEnd {
    /// The peer closed the stream or the local side shut down.
    Closed,
    /// The transport surfaced a gRPC status.
    Failed(Status),
}

struct WriteItem {
    msg: StreamMsg,
    ack: Option<AckFn>,
}

/// Options for a client-role stream.
pub struct ClientStreamOptions {
    /// Peer address.
    pub ip: String,
    /// Peer port.
    pub port: u16,
    /// How long the stream may stay disconnected before going abnormal.
    pub disconnected_timeout: Duration,
    /// Floor of the doubling reconnect backoff.
    pub backoff_min: Duration,
    /// Ceiling of the doubling reconnect backoff.
    pub backoff_max: Duration,
    /// TLS material for the channel.
    pub security: Option<Security>,
    /// Invoked with the peer id after every successful reconnect.
    pub resend_cb: Option<PeerCallback>,
    /// Invoked with the peer id when the disconnect window is exhausted.
    pub disconnected_cb: Option<PeerCallback>,
    /// Re-handshake hook for `UNAUTHENTICATED` transport failures.
    pub discover_cb: Option<DiscoverCb>,
}

/// A bound reader/writer pair over one logical connection.
pub struct StreamRw {
    src_instance: String,
    dst_instance: String,
    runtime_id: String,
    direct: bool,
    batched: bool,
    max_msg_bytes: usize,
    connected: AtomicBool,
    abnormal: AtomicBool,
    stopped: AtomicBool,
    queue_tx: mpsc::UnboundedSender<WriteItem>,
    shutdown_tx: watch::Sender<bool>,
}

impl StreamRw {
    /// The peer this stream is bound to.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.dst_instance
    }

    /// Whether writes are currently expected to succeed.
    #[must_use]
    pub fn available(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.abnormal.load(Ordering::Acquire)
    }

    /// Terminal-failure flag.
    #[must_use]
    pub fn abnormal(&self) -> bool {
        self.abnormal.load(Ordering::Acquire)
    }

    /// Observable lifecycle state.
    #[must_use]
    pub fn state(&self) -> StreamState {
        if self.abnormal() {
            StreamState::Abnormal
        } else if self.connected.load(Ordering::Acquire) {
            StreamState::Connected
        } else if self.stopped.load(Ordering::Acquire) {
            StreamState::Disconnecting
        } else {
            StreamState::Connecting
        }
    }

    /// Enqueues an envelope.
    ///
    /// `prewrite` runs synchronously with the resolved direct/proxy decision
    /// before anything else. `ack` fires exactly once: immediately with an
    /// error when the stream cannot take writes, otherwise after the frame
    /// carrying the message was handed to the transport.
    pub fn write(&self, msg: StreamMsg, ack: Option<AckFn>, prewrite: Option<PrewriteFn>) {
        if let Some(prewrite) = prewrite {
            prewrite(self.direct);
        }
        if self.stopped.load(Ordering::Acquire) || !self.available() {
            if let Some(ack) = ack {
                ack(
                    self.direct,
                    Err(ErrorInfo::communication("bus stream is unavailable")),
                );
            }
            return;
        }
        if let Err(rejected) = self.queue_tx.send(WriteItem { msg, ack }) {
            if let Some(ack) = rejected.0.ack {
                ack(
                    self.direct,
                    Err(ErrorInfo::communication("bus stream is closed")),
                );
            }
        }
    }

    /// Idempotent teardown: stops both loops and fails queued writes with a
    /// communication error.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("stopping stream to {}", self.dst_instance);
        self.abnormal.store(true, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send_replace(true);
    }

    fn new_parts(
        src_instance: String,
        dst_instance: String,
        runtime_id: String,
        batched: bool,
        max_msg_bytes: usize,
        connected: bool,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<WriteItem>, watch::Receiver<bool>) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let direct = dst_instance != FUNCTION_PROXY;
        let rw = Arc::new(StreamRw {
            src_instance,
            dst_instance,
            runtime_id,
            direct,
            batched,
            max_msg_bytes,
            connected: AtomicBool::new(connected),
            abnormal: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            queue_tx,
            shutdown_tx,
        });
        (rw, queue_rx, shutdown_rx)
    }

    /// Builds a client-role stream: connects (bounded retries), then spawns
    /// the driver that owns the writer/reader loops and reconnection.
    pub async fn connect_client(
        src_instance: String,
        dst_instance: String,
        runtime_id: String,
        pool: Arc<ConnectionPool>,
        opts: ClientStreamOptions,
        dispatcher: Dispatcher,
    ) -> Result<Arc<Self>, ErrorInfo> {
        let batched = dst_instance != FUNCTION_PROXY;
        let max_msg_bytes = pool.max_msg_bytes();
        let (rw, queue_rx, shutdown_rx) = Self::new_parts(
            src_instance,
            dst_instance.clone(),
            runtime_id,
            batched,
            max_msg_bytes,
            true,
        );

        let mut last_err = ErrorInfo::new(
            ErrorCode::ErrConnectionFailed,
            format!("failed to build stream to {dst_instance}"),
        );
        let mut transport = None;
        for attempt in 0..START_RETRY_TIMES {
            match build_client_transport(&rw, &pool, &opts).await {
                Ok(t) => {
                    transport = Some(t);
                    break;
                }
                Err(e) => {
                    debug!(
                        "stream to {dst_instance} connect attempt {attempt} failed: {e}"
                    );
                    last_err = e;
                    tokio::time::sleep(RECONNECT_INTERVAL).await;
                }
            }
        }
        let Some(transport) = transport else {
            rw.abnormal.store(true, Ordering::Release);
            warn!(
                "failed to establish connection to {dst_instance} after {START_RETRY_TIMES} tries: {last_err}"
            );
            return Err(last_err);
        };

        let driver = ClientDriver {
            rw: Arc::clone(&rw),
            pool,
            opts,
            dispatcher,
        };
        let _ = tokio::spawn(driver.run(transport, queue_rx, shutdown_rx));
        Ok(rw)
    }

    /// Wraps an accepted inbound stream into a server-role `StreamRw`.
    ///
    /// Returns the stream plus a handle resolving when the peer disconnects.
    pub fn serve(
        src_instance: String,
        dst_instance: String,
        runtime_id: String,
        max_msg_bytes: usize,
        sink: FrameSink,
        source: FrameSource,
        dispatcher: Dispatcher,
    ) -> (Arc<Self>, tokio::task::JoinHandle<()>) {
        let batched = sink.is_batched();
        let (rw, mut queue_rx, mut shutdown_rx) = Self::new_parts(
            src_instance,
            dst_instance,
            runtime_id,
            batched,
            max_msg_bytes,
            true,
        );
        let task_rw = Arc::clone(&rw);
        let dispatcher = Arc::clone(&dispatcher);
        let handle = tokio::spawn(async move {
            let mut source = source;
            let _ = task_rw
                .pump(&sink, &mut source, &mut queue_rx, &mut shutdown_rx, &dispatcher)
                .await;
            task_rw.connected.store(false, Ordering::Release);
            drain_queue(&task_rw, &mut queue_rx);
            debug!("server stream from {} ended", task_rw.peer());
        });
        (rw, handle)
    }

    /// Runs writer and reader concurrently until the transport fails, the
    /// peer closes, or shutdown is requested.
    async fn pump(
        &self,
        sink: &FrameSink,
        source: &mut FrameSource,
        queue_rx: &mut mpsc::UnboundedReceiver<WriteItem>,
        shutdown_rx: &mut watch::Receiver<bool>,
        dispatcher: &Dispatcher,
    ) -> PumpEnd {
        loop {
            tokio::select! {
                item = queue_rx.recv() => match item {
                    Some(item) => {
                        if !self.flush_outbound(sink, item, queue_rx).await {
                            return PumpEnd::Closed;
                        }
                    }
                    None => return PumpEnd::Closed,
                },
                frame = source.next() => match frame {
                    Ok(Some(msgs)) => {
                        for msg in msgs {
                            self.deliver(msg, dispatcher);
                        }
                    }
                    Ok(None) => {
                        info!("stream to {} closed by peer", self.dst_instance);
                        return PumpEnd::Closed;
                    }
                    Err(status) => {
                        info!(
                            "stream to {} failed: {} {}",
                            self.dst_instance,
                            status.code(),
                            status.message()
                        );
                        return PumpEnd::Failed(status);
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return PumpEnd::Closed;
                    }
                }
            }
        }
    }

    async fn flush_outbound(
        &self,
        sink: &FrameSink,
        first: WriteItem,
        queue_rx: &mut mpsc::UnboundedReceiver<WriteItem>,
    ) -> bool {
        if self.batched {
            self.write_batched(sink, first, queue_rx).await
        } else {
            self.write_single(sink, first).await
        }
    }

    async fn write_single(&self, sink: &FrameSink, item: WriteItem) -> bool {
        let WriteItem { msg, ack } = item;
        let outcome = if let Err(e) = self.check_size(&msg) {
            Err(e)
        } else if !self.available() {
            Err(ErrorInfo::communication("bus stream is unavailable"))
        } else if !sink.send_single(msg).await {
            Err(ErrorInfo::communication("bus stream rpc error"))
        } else {
            Ok(())
        };
        let alive = !matches!(
            outcome,
            Err(ref e) if e.code == ErrorCode::ErrInnerCommunication
        );
        if let Some(ack) = ack {
            ack(self.direct, outcome);
        }
        alive
    }

    /// Drains the queue into batched frames. Per-queue FIFO order and
    /// per-message acks are preserved; a message whose own size exceeds the
    /// budget fails alone and the rest roll over to following frames.
    async fn write_batched(
        &self,
        sink: &FrameSink,
        first: WriteItem,
        queue_rx: &mut mpsc::UnboundedReceiver<WriteItem>,
    ) -> bool {
        let mut pending = VecDeque::new();
        pending.push_back(first);
        loop {
            while let Ok(item) = queue_rx.try_recv() {
                pending.push_back(item);
            }
            if pending.is_empty() {
                return true;
            }

            let mut msgs = Vec::new();
            let mut acks = Vec::new();
            let mut total = 0usize;
            while let Some(item) = pending.front() {
                let size = item.msg.encoded_len();
                if size > self.max_msg_bytes {
                    let item = pending.pop_front().expect("front checked");
                    if let Some(ack) = item.ack {
                        ack(self.direct, Err(self.oversize_error(&item.msg, size)));
                    }
                    continue;
                }
                if total + size > self.max_msg_bytes {
                    break;
                }
                total += size;
                let item = pending.pop_front().expect("front checked");
                msgs.push(item.msg);
                acks.push(item.ack);
            }
            if msgs.is_empty() {
                continue;
            }

            let outcome = if !self.available() {
                Err(ErrorInfo::communication("bus stream is unavailable"))
            } else if !sink.send_batch(BatchStreamMsg { msgs }).await {
                Err(ErrorInfo::communication("bus stream rpc error"))
            } else {
                Ok(())
            };
            let failed = outcome.is_err();
            for ack in acks.into_iter().flatten() {
                ack(self.direct, outcome.clone());
            }
            if failed {
                // fail whatever is left too; the transport is gone
                for item in pending {
                    if let Some(ack) = item.ack {
                        ack(
                            self.direct,
                            Err(ErrorInfo::communication("bus stream rpc error")),
                        );
                    }
                }
                return false;
            }
        }
    }

    fn check_size(&self, msg: &StreamMsg) -> Result<(), ErrorInfo> {
        let size = msg.encoded_len();
        if size > self.max_msg_bytes {
            return Err(self.oversize_error(msg, size));
        }
        Ok(())
    }

    fn oversize_error(&self, msg: &StreamMsg, size: usize) -> ErrorInfo {
        // Deliberately not a communication code: oversize must never retry.
        let message = format!(
            "failed to send message (message ID: {}), the message size ({size} bytes) exceeds the limit ({} bytes)",
            msg.message_id, self.max_msg_bytes
        );
        warn!("{message}");
        ErrorInfo::param_invalid(message)
    }

    fn deliver(&self, msg: StreamMsg, dispatcher: &Dispatcher) {
        let msg = if self.direct {
            translate_direct(msg, &self.dst_instance)
        } else {
            msg
        };
        dispatcher(&self.dst_instance, msg);
    }
}

/// The direct path reuses proxy-shaped handlers: rewrite peer-to-peer kinds
/// into the shape the handler registry expects.
fn translate_direct(msg: StreamMsg, from_peer: &str) -> StreamMsg {
    let StreamMsg { message_id, body } = msg;
    let body = match body {
        Some(Body::InvokeReq(invoke)) => Some(Body::CallReq(CallReq {
            request_id: invoke.request_id,
            trace_id: invoke.trace_id,
            function: invoke.function,
            is_create: false,
            args: invoke.args,
            create_options: invoke
                .invoke_options
                .map(|o| o.custom_tags)
                .unwrap_or_default(),
            return_object_ids: invoke.return_object_ids,
            sender_id: from_peer.to_owned(),
        })),
        Some(Body::CallRsp(call_rsp)) => Some(Body::InvokeRsp(InvokeRsp {
            code: call_rsp.code,
            message: call_rsp.message,
            request_id: call_rsp.request_id,
        })),
        Some(Body::CallResultReq(result)) => Some(Body::NotifyReq(NotifyReq {
            code: result.code,
            message: result.message,
            request_id: result.request_id,
            small_objects: result.small_objects,
            stack_trace_infos: result.stack_trace_infos,
            // route info is dropped to avoid triggering a second stream
            route_info: None,
        })),
        Some(Body::NotifyRsp(_)) => Some(Body::CallResultAck(CallResultAck {
            // a direct ack never carries an error
            code: ErrorCode::ErrNone as i32,
            message: String::new(),
        })),
        other => other,
    };
    StreamMsg { message_id, body }
}

fn drain_queue(rw: &StreamRw, queue_rx: &mut mpsc::UnboundedReceiver<WriteItem>) {
    queue_rx.close();
    let mut unprocessed = 0usize;
    while let Ok(item) = queue_rx.try_recv() {
        unprocessed += 1;
        if let Some(ack) = item.ack {
            ack(
                rw.direct,
                Err(ErrorInfo::communication("bus stream is closed")),
            );
        }
    }
    if unprocessed > 0 {
        debug!(
            "stream to {} stopped with {unprocessed} unprocessed writes",
            rw.dst_instance
        );
    }
}

/// Outbound end of a stream's transport.
pub enum FrameSink {
    /// Client single-message request stream.
    Client(mpsc::Sender<StreamMsg>),
    /// Client batched request stream.
    ClientBatch(mpsc::Sender<BatchStreamMsg>),
    /// Server single-message response stream.
    Server(mpsc::Sender<Result<StreamMsg, Status>>),
    /// Server batched response stream.
    ServerBatch(mpsc::Sender<Result<BatchStreamMsg, Status>>),
}

impl FrameSink {
    fn is_batched(&self) -> bool {
        matches!(self, FrameSink::ClientBatch(_) | FrameSink::ServerBatch(_))
    }

    async fn send_single(&self, msg: StreamMsg) -> bool {
        match self {
            FrameSink::Client(tx) => tx.send(msg).await.is_ok(),
            FrameSink::Server(tx) => tx.send(Ok(msg)).await.is_ok(),
            _ => false,
        }
    }

    async fn send_batch(&self, batch: BatchStreamMsg) -> bool {
        match self {
            FrameSink::ClientBatch(tx) => tx.send(batch).await.is_ok(),
            FrameSink::ServerBatch(tx) => tx.send(Ok(batch)).await.is_ok(),
            _ => false,
        }
    }
}

/// Inbound end of a stream's transport.
pub enum FrameSource {
    /// Single-message inbound stream.
    Single(Streaming<StreamMsg>),
    /// Batched inbound stream.
    Batch(Streaming<BatchStreamMsg>),
}

impl FrameSource {
    async fn next(&mut self) -> Result<Option<Vec<StreamMsg>>, Status> {
        match self {
            FrameSource::Single(s) => Ok(s.message().await?.map(|m| vec![m])),
            FrameSource::Batch(s) => Ok(s.message().await?.map(|b| b.msgs)),
        }
    }
}

struct ClientDriver {
    rw: Arc<StreamRw>,
    pool: Arc<ConnectionPool>,
    opts: ClientStreamOptions,
    dispatcher: Dispatcher,
}

impl ClientDriver {
    async fn run(
        self,
        mut transport: (FrameSink, FrameSource),
        mut queue_rx: mpsc::UnboundedReceiver<WriteItem>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let rw = &self.rw;
        info!("begin to receive messages from {}", rw.dst_instance);
        loop {
            let (sink, mut source) = transport;
            rw.connected.store(true, Ordering::Release);
            let end = rw
                .pump(&sink, &mut source, &mut queue_rx, &mut shutdown_rx, &self.dispatcher)
                .await;
            rw.connected.store(false, Ordering::Release);
            let disconnected_at = Instant::now();
            let _ = self.pool.release(&self.opts.ip, self.opts.port);

            if rw.stopped.load(Ordering::Acquire) || *shutdown_rx.borrow() {
                break;
            }
            match end {
                PumpEnd::Failed(status) if status.code() == tonic::Code::InvalidArgument => {
                    // instance id mismatch, give up forever
                    warn!(
                        "stream to {} rejected: {}; marking abnormal",
                        rw.dst_instance,
                        status.message()
                    );
                    rw.abnormal.store(true, Ordering::Release);
                    break;
                }
                PumpEnd::Failed(status) if status.code() == tonic::Code::Unauthenticated => {
                    if let Some(discover) = &self.opts.discover_cb {
                        if let Err(e) = discover().await {
                            warn!("re-discover after auth loss failed: {e}");
                        }
                    }
                }
                _ => {}
            }

            match self.reconnect(disconnected_at, &mut shutdown_rx).await {
                Some(t) => {
                    transport = t;
                    // writes must succeed again before resend re-enqueues
                    rw.connected.store(true, Ordering::Release);
                    if let Some(resend) = &self.opts.resend_cb {
                        resend(&rw.dst_instance);
                    }
                }
                None => break,
            }
        }
        rw.connected.store(false, Ordering::Release);
        drain_queue(rw, &mut queue_rx);
        info!("end of receiver for {}", rw.dst_instance);
    }

    /// Attempts to rebuild the transport, doubling the backoff between
    /// tries, until the disconnect window runs out. Returns `None` once the
    /// stream should give up.
    async fn reconnect(
        &self,
        disconnected_at: Instant,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Option<(FrameSink, FrameSource)> {
        let rw = &self.rw;
        let mut backoff = self.opts.backoff_min;
        loop {
            if rw.stopped.load(Ordering::Acquire) || *shutdown_rx.borrow() {
                return None;
            }
            if disconnected_at.elapsed() >= self.opts.disconnected_timeout {
                warn!(
                    "stream to {} stayed disconnected for {:?}, giving up",
                    rw.dst_instance, self.opts.disconnected_timeout
                );
                rw.abnormal.store(true, Ordering::Release);
                if let Some(disconnected) = &self.opts.disconnected_cb {
                    disconnected(&rw.dst_instance);
                }
                return None;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.opts.backoff_max);
            match build_client_transport(rw, &self.pool, &self.opts).await {
                Ok(t) => {
                    info!("reconnected stream to {}", rw.dst_instance);
                    return Some(t);
                }
                Err(e) => {
                    debug!("reconnect to {} failed: {e}", rw.dst_instance);
                }
            }
        }
    }
}

async fn build_client_transport(
    rw: &StreamRw,
    pool: &ConnectionPool,
    opts: &ClientStreamOptions,
) -> Result<(FrameSink, FrameSource), ErrorInfo> {
    let channel = match pool.get(&opts.ip, opts.port) {
        Some(channel) => channel,
        None => pool.create(&opts.ip, opts.port, opts.security.as_ref()).await?,
    };
    let max = pool.max_msg_bytes();
    let mut client = FnBusClient::new(channel)
        .max_decoding_message_size(max)
        .max_encoding_message_size(max);

    let result = if rw.batched {
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAP);
        match stream_request(rw, ReceiverStream::new(rx)) {
            Ok(request) => client.batch_msg_stream(request).await.map(|rsp| {
                (FrameSink::ClientBatch(tx), FrameSource::Batch(rsp.into_inner()))
            }),
            Err(e) => {
                let _ = pool.release(&opts.ip, opts.port);
                return Err(e);
            }
        }
    } else {
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAP);
        match stream_request(rw, ReceiverStream::new(rx)) {
            Ok(request) => client.msg_stream(request).await.map(|rsp| {
                (FrameSink::Client(tx), FrameSource::Single(rsp.into_inner()))
            }),
            Err(e) => {
                let _ = pool.release(&opts.ip, opts.port);
                return Err(e);
            }
        }
    };
    match result {
        Ok(transport) => Ok(transport),
        Err(status) => {
            let _ = pool.release(&opts.ip, opts.port);
            Err(ErrorInfo::new(
                ErrorCode::ErrConnectionFailed,
                format!(
                    "failed to build stream to {}: {} {}",
                    rw.dst_instance,
                    status.code(),
                    status.message()
                ),
            ))
        }
    }
}

fn stream_request<S>(rw: &StreamRw, stream: S) -> Result<Request<S>, ErrorInfo> {
    let mut request = Request::new(stream);
    let meta = request.metadata_mut();
    for (key, value) in [
        ("instance_id", rw.src_instance.as_str()),
        ("runtime_id", rw.runtime_id.as_str()),
        ("source_id", rw.src_instance.as_str()),
        ("dst_id", rw.dst_instance.as_str()),
    ] {
        let value = value.parse().map_err(|_| {
            ErrorInfo::param_invalid(format!("stream metadata {key} is not ascii"))
        })?;
        let _ = meta.insert(key, value);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnbus_proto::proto::fnbus::v1::{CallResultReq, CallRsp, InvokeOptions, InvokeReq, NotifyRsp, RouteInfo};

    fn direct_msg(body: Body) -> StreamMsg {
        StreamMsg {
            message_id: "m-01".into(),
            body: Some(body),
        }
    }

    #[test]
    fn invoke_req_becomes_call_req_with_sender() {
        let mut tags = std::collections::HashMap::new();
        let _ = tags.insert("tenant".to_owned(), "blue".to_owned());
        let msg = direct_msg(Body::InvokeReq(InvokeReq {
            request_id: "r1".into(),
            trace_id: "t1".into(),
            instance_id: "peer-a".into(),
            function: "f".into(),
            args: vec![],
            invoke_options: Some(InvokeOptions {
                custom_tags: tags.clone(),
                priority: 0,
            }),
            return_object_ids: vec!["o1".into()],
        }));
        let out = translate_direct(msg, "peer-a");
        match out.body {
            Some(Body::CallReq(call)) => {
                assert!(!call.is_create);
                assert_eq!(call.request_id, "r1");
                assert_eq!(call.function, "f");
                assert_eq!(call.sender_id, "peer-a");
                assert_eq!(call.create_options, tags);
                assert_eq!(call.return_object_ids, vec!["o1".to_owned()]);
            }
            other => panic!("expected CallReq, got {other:?}"),
        }
        assert_eq!(out.message_id, "m-01");
    }

    #[test]
    fn call_rsp_becomes_invoke_rsp() {
        let msg = direct_msg(Body::CallRsp(CallRsp {
            code: ErrorCode::ErrUserFunctionException as i32,
            message: "boom".into(),
            request_id: "r2".into(),
        }));
        match translate_direct(msg, "peer-a").body {
            Some(Body::InvokeRsp(rsp)) => {
                assert_eq!(rsp.code(), ErrorCode::ErrUserFunctionException);
                assert_eq!(rsp.message, "boom");
            }
            other => panic!("expected InvokeRsp, got {other:?}"),
        }
    }

    #[test]
    fn call_result_drops_route_info() {
        let msg = direct_msg(Body::CallResultReq(CallResultReq {
            code: ErrorCode::ErrNone as i32,
            message: String::new(),
            request_id: "r3".into(),
            instance_id: "peer-a".into(),
            small_objects: vec![],
            stack_trace_infos: vec![],
            route_info: Some(RouteInfo {
                server_ip: "10.0.0.9".into(),
                server_port: 31501,
            }),
        }));
        match translate_direct(msg, "peer-a").body {
            Some(Body::NotifyReq(notify)) => {
                assert!(notify.route_info.is_none());
                assert_eq!(notify.request_id, "r3");
            }
            other => panic!("expected NotifyReq, got {other:?}"),
        }
    }

    #[test]
    fn notify_rsp_becomes_successful_ack() {
        let msg = direct_msg(Body::NotifyRsp(NotifyRsp {
            code: ErrorCode::ErrInnerSystemError as i32,
            message: "ignored".into(),
        }));
        match translate_direct(msg, "peer-a").body {
            Some(Body::CallResultAck(ack)) => assert_eq!(ack.code(), ErrorCode::ErrNone),
            other => panic!("expected CallResultAck, got {other:?}"),
        }
    }

    #[test]
    fn proxy_kinds_pass_through_untranslated() {
        let msg = direct_msg(Body::NotifyReq(NotifyReq::default()));
        assert!(matches!(
            translate_direct(msg, "peer-a").body,
            Some(Body::NotifyReq(_))
        ));
    }
}
