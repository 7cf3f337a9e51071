// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Inbound request handling: the user handler registry, the instance
//! lifecycle gate, the in-flight dedupe set and the per-category worker
//! lanes that keep handler latency off the stream reader.

use fnbus_proto::ErrorCode;
use fnbus_proto::proto::fnbus::v1::{
    CallReq, CallRsp, CheckpointReq, CheckpointRsp, HeartbeatReq, HeartbeatRsp, NotifyRsp,
    RecoverReq, RecoverRsp, ShutdownReq, ShutdownRsp, SignalReq, SignalRsp,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, warn};

const NOTIFY_WORKERS: usize = 2;
const SIGNAL_WORKERS: usize = 10;

/// User-supplied handlers for inbound requests.
///
/// `init` and `call` deliver their results later through
/// `return_call_result`; the remaining handlers answer inline.
#[async_trait::async_trait]
pub trait Handlers: Send + Sync {
    /// Handles the create call that initializes this instance.
    async fn init(&self, call: CallReq);
    /// Handles a non-create call.
    async fn call(&self, call: CallReq);
    /// Checkpoints instance state.
    async fn checkpoint(&self, req: CheckpointReq) -> CheckpointRsp;
    /// Restores instance state.
    async fn recover(&self, req: RecoverReq) -> RecoverRsp;
    /// Runs user shutdown logic; invoked at most once.
    async fn shutdown(&self, req: ShutdownReq) -> ShutdownRsp;
    /// Handles an out-of-band signal.
    async fn signal(&self, req: SignalReq) -> SignalRsp;
    /// Answers a liveness probe. The default implementation acks.
    async fn heartbeat(&self, req: HeartbeatReq) -> HeartbeatRsp {
        let _ = req;
        HeartbeatRsp {
            code: ErrorCode::ErrNone as i32,
        }
    }
}

/// Lifecycle of the containing worker instance.
///
/// `Started → Initializing → (InitializingFailure | Initialized) →
/// ShuttingDown → Shutdown`. Non-create calls wait for `Initialized`; the
/// shutdown handler runs at most once.
pub struct InstanceStatus {
    state: Mutex<StateInner>,
    init_done: watch::Sender<bool>,
    shutdown_done: watch::Sender<bool>,
}

struct StateInner {
    state: InstanceState,
    err: Option<(ErrorCode, String)>,
}

/// Discrete instance lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Process is up, no create call seen.
    Started,
    /// The create call is running.
    Initializing,
    /// The create call failed; the error gates later calls.
    InitializingFailure,
    /// Ready for calls.
    Initialized,
    /// Shutdown handler running.
    ShuttingDown,
    /// Fully shut down.
    Shutdown,
}

impl Default for InstanceStatus {
    fn default() -> Self {
        Self {
            state: Mutex::new(StateInner {
                state: InstanceState::Started,
                err: None,
            }),
            init_done: watch::channel(false).0,
            shutdown_done: watch::channel(false).0,
        }
    }
}

impl InstanceStatus {
    /// Claims the initializing slot. Only the first create call wins.
    pub fn set_initializing(&self) -> bool {
        let mut inner = self.state.lock();
        if inner.state == InstanceState::Started {
            inner.state = InstanceState::Initializing;
        }
        inner.state == InstanceState::Initializing
    }

    /// Marks initialization done and releases waiters.
    pub fn set_initialized(&self) {
        {
            let mut inner = self.state.lock();
            if inner.state == InstanceState::Initializing {
                inner.state = InstanceState::Initialized;
            }
        }
        let _ = self.init_done.send_replace(true);
    }

    /// Records an initialization failure and releases waiters.
    pub fn set_initializing_failure(&self, code: ErrorCode, message: impl Into<String>) {
        {
            let mut inner = self.state.lock();
            if inner.state == InstanceState::Initializing {
                inner.state = InstanceState::InitializingFailure;
                inner.err = Some((code, message.into()));
            }
        }
        let _ = self.init_done.send_replace(true);
    }

    /// Waits until initialization settled; true means `Initialized`.
    pub async fn wait_initialized(&self) -> bool {
        let mut rx = self.init_done.subscribe();
        if rx.wait_for(|done| *done).await.is_err() {
            return false;
        }
        self.state.lock().state == InstanceState::Initialized
    }

    /// The recorded initialization error, if any.
    #[must_use]
    pub fn error(&self) -> Option<(ErrorCode, String)> {
        self.state.lock().err.clone()
    }

    /// Moves towards shutdown; false when already fully shut down.
    pub fn set_shutting_down(&self) -> bool {
        let mut inner = self.state.lock();
        if inner.state != InstanceState::Shutdown {
            inner.state = InstanceState::ShuttingDown;
        }
        inner.state == InstanceState::ShuttingDown
    }

    /// Marks shutdown complete and releases waiters.
    pub fn set_shutdown(&self) {
        {
            let mut inner = self.state.lock();
            if inner.state == InstanceState::ShuttingDown {
                inner.state = InstanceState::Shutdown;
            }
        }
        let _ = self.shutdown_done.send_replace(true);
    }

    /// Waits until the shutdown handler finished.
    pub async fn wait_shutdown(&self) -> bool {
        let mut rx = self.shutdown_done.subscribe();
        if rx.wait_for(|done| *done).await.is_err() {
            return false;
        }
        self.state.lock().state == InstanceState::Shutdown
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.state.lock().state
    }
}

/// In-flight inbound request ids: dedupes retransmissions and backs
/// graceful drain.
pub struct ProcessingRequestSet {
    ids: Mutex<HashSet<String>>,
    count: watch::Sender<usize>,
}

impl Default for ProcessingRequestSet {
    fn default() -> Self {
        Self {
            ids: Mutex::new(HashSet::new()),
            count: watch::channel(0).0,
        }
    }
}

impl ProcessingRequestSet {
    /// Records a request id; false when it is already in flight.
    pub fn insert(&self, request_id: &str) -> bool {
        let mut ids = self.ids.lock();
        let inserted = ids.insert(request_id.to_owned());
        let _ = self.count.send_replace(ids.len());
        inserted
    }

    /// Drops a request id; false when it was not tracked.
    pub fn remove(&self, request_id: &str) -> bool {
        let mut ids = self.ids.lock();
        let removed = ids.remove(request_id);
        let _ = self.count.send_replace(ids.len());
        removed
    }

    /// Waits until no request is in flight or `grace` ran out. Returns the
    /// unused remainder of the grace period.
    pub async fn wait_empty(&self, grace: Duration) -> Duration {
        let deadline = tokio::time::Instant::now() + grace;
        let mut rx = self.count.subscribe();
        let drained = tokio::time::timeout_at(deadline, rx.wait_for(|count| *count == 0));
        if drained.await.is_err() {
            debug!(
                "drain grace ran out with {} unfinished requests",
                self.ids.lock().len()
            );
            return Duration::ZERO;
        }
        deadline.saturating_duration_since(tokio::time::Instant::now())
    }
}

type Job = BoxFuture<'static, ()>;

/// A worker lane: serialized, or a bounded pool.
enum Lane {
    Serial(mpsc::UnboundedSender<Job>),
    Pooled(Arc<Semaphore>),
}

impl Lane {
    fn serial() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let _ = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
        });
        Lane::Serial(tx)
    }

    fn pooled(permits: usize) -> Self {
        Lane::Pooled(Arc::new(Semaphore::new(permits)))
    }

    fn dispatch(&self, job: Job) {
        match self {
            Lane::Serial(tx) => {
                if tx.send(job).is_err() {
                    warn!("worker lane is gone, dropping job");
                }
            }
            Lane::Pooled(sem) => {
                let sem = Arc::clone(sem);
                let _ = tokio::spawn(async move {
                    let Ok(_permit) = sem.acquire().await else {
                        return;
                    };
                    job.await;
                });
            }
        }
    }
}

/// Answers an inbound request with a typed response.
pub type Respond<T> = Box<dyn FnOnce(T) + Send>;

/// Routes inbound requests to handlers on per-category lanes.
pub struct InboundDispatch {
    handlers: Arc<dyn Handlers>,
    status: Arc<InstanceStatus>,
    processing: Arc<ProcessingRequestSet>,
    call_lane: Lane,
    notify_lane: Lane,
    ckpt_lane: Lane,
    shutdown_lane: Lane,
    signal_lane: Lane,
    heartbeat_lane: Lane,
    resp_lane: Lane,
}

impl InboundDispatch {
    /// Builds the dispatch with its worker lanes running.
    #[must_use]
    pub fn new(handlers: Arc<dyn Handlers>) -> Self {
        Self {
            handlers,
            status: Arc::new(InstanceStatus::default()),
            processing: Arc::new(ProcessingRequestSet::default()),
            call_lane: Lane::serial(),
            notify_lane: Lane::pooled(NOTIFY_WORKERS),
            ckpt_lane: Lane::serial(),
            shutdown_lane: Lane::serial(),
            signal_lane: Lane::pooled(SIGNAL_WORKERS),
            heartbeat_lane: Lane::serial(),
            resp_lane: Lane::serial(),
        }
    }

    /// The instance lifecycle gate.
    #[must_use]
    pub fn status(&self) -> &Arc<InstanceStatus> {
        &self.status
    }

    /// The in-flight request set.
    #[must_use]
    pub fn processing(&self) -> &Arc<ProcessingRequestSet> {
        &self.processing
    }

    /// Handles an inbound call request with lifecycle gating and dedupe.
    ///
    /// A retransmitted request id is acked immediately without re-dispatch.
    /// The create call claims the initializing slot and runs `init`; any
    /// other call waits for `Initialized` first.
    pub fn handle_call(&self, call: CallReq, respond: Respond<CallRsp>) {
        let request_id = call.request_id.clone();
        if !self.processing.insert(&request_id) {
            debug!("duplicated call request, request ID: {request_id}");
            respond(ok_call_rsp(request_id));
            return;
        }
        let handlers = Arc::clone(&self.handlers);
        let status = Arc::clone(&self.status);
        let processing = Arc::clone(&self.processing);
        self.call_lane.dispatch(Box::pin(async move {
            if call.is_create {
                if status.set_initializing() {
                    respond(ok_call_rsp(request_id));
                    handlers.init(call).await;
                } else {
                    let ok = status.wait_initialized().await;
                    let rsp = gated_call_rsp(ok, &status, request_id.clone());
                    let failed = rsp.code != ErrorCode::ErrNone as i32;
                    respond(rsp);
                    if failed {
                        let _ = processing.remove(&request_id);
                    }
                }
            } else if status.wait_initialized().await {
                respond(ok_call_rsp(request_id));
                handlers.call(call).await;
            } else {
                let rsp = gated_call_rsp(false, &status, request_id.clone());
                respond(rsp);
                let _ = processing.remove(&request_id);
            }
        }));
    }

    /// Runs the notify delivery plus its wire response off the reader.
    pub fn handle_notify(
        &self,
        deliver: Box<dyn FnOnce() -> NotifyRsp + Send>,
        respond: Respond<NotifyRsp>,
    ) {
        self.notify_lane.dispatch(Box::pin(async move {
            respond(deliver());
        }));
    }

    /// Runs the checkpoint handler on the checkpoint/recover lane.
    pub fn handle_checkpoint(&self, req: CheckpointReq, respond: Respond<CheckpointRsp>) {
        let handlers = Arc::clone(&self.handlers);
        self.ckpt_lane.dispatch(Box::pin(async move {
            respond(handlers.checkpoint(req).await);
        }));
    }

    /// Runs the recover handler; success re-arms the initialized gate.
    pub fn handle_recover(&self, req: RecoverReq, respond: Respond<RecoverRsp>) {
        let handlers = Arc::clone(&self.handlers);
        let status = Arc::clone(&self.status);
        self.ckpt_lane.dispatch(Box::pin(async move {
            let rsp = handlers.recover(req).await;
            if rsp.code == ErrorCode::ErrNone as i32 {
                debug!("set initialized status for recover");
                let _ = status.set_initializing();
                status.set_initialized();
            }
            respond(rsp);
        }));
    }

    /// Runs the shutdown handler at most once; later requests wait for the
    /// first to finish and ack.
    pub fn handle_shutdown(&self, req: ShutdownReq, respond: Respond<ShutdownRsp>) {
        let handlers = Arc::clone(&self.handlers);
        let status = Arc::clone(&self.status);
        self.shutdown_lane.dispatch(Box::pin(async move {
            if status.set_shutting_down() {
                let rsp = handlers.shutdown(req).await;
                respond(rsp);
                status.set_shutdown();
            } else {
                let _ = status.wait_shutdown().await;
                respond(ShutdownRsp {
                    code: ErrorCode::ErrNone as i32,
                    message: String::new(),
                });
            }
        }));
    }

    /// Runs the signal handler on the signal pool.
    pub fn handle_signal(&self, req: SignalReq, respond: Respond<SignalRsp>) {
        let handlers = Arc::clone(&self.handlers);
        self.signal_lane.dispatch(Box::pin(async move {
            debug!(
                "received signal request, signal {} for request {}",
                req.signal, req.request_id
            );
            respond(handlers.signal(req).await);
        }));
    }

    /// Runs the heartbeat handler.
    pub fn handle_heartbeat(&self, req: HeartbeatReq, respond: Respond<HeartbeatRsp>) {
        let handlers = Arc::clone(&self.handlers);
        self.heartbeat_lane.dispatch(Box::pin(async move {
            respond(handlers.heartbeat(req).await);
        }));
    }

    /// Runs response-correlation work off the reader.
    pub fn handle_response(&self, job: BoxFuture<'static, ()>) {
        self.resp_lane.dispatch(job);
    }
}

fn ok_call_rsp(request_id: String) -> CallRsp {
    CallRsp {
        code: ErrorCode::ErrNone as i32,
        message: String::new(),
        request_id,
    }
}

fn gated_call_rsp(ok: bool, status: &InstanceStatus, request_id: String) -> CallRsp {
    if ok {
        return ok_call_rsp(request_id);
    }
    let (code, message) = status.error().unwrap_or((
        ErrorCode::ErrInnerSystemError,
        "instance is not initialized".to_owned(),
    ));
    CallRsp {
        code: code as i32,
        message,
        request_id,
    }
}

impl std::fmt::Debug for InboundDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundDispatch")
            .field("state", &self.status.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandlers {
        inits: AtomicUsize,
        calls: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    impl CountingHandlers {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inits: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                shutdowns: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl Handlers for CountingHandlers {
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
            let _ = self.shutdowns.fetch_add(1, Ordering::SeqCst);
            ShutdownRsp::default()
        }
        async fn signal(&self, _req: SignalReq) -> SignalRsp {
            SignalRsp::default()
        }
    }

    fn create_call(request_id: &str) -> CallReq {
        CallReq {
            request_id: request_id.to_owned(),
            is_create: true,
            ..Default::default()
        }
    }

    fn respond_into(tx: mpsc::UnboundedSender<CallRsp>) -> Respond<CallRsp> {
        Box::new(move |rsp| {
            let _ = tx.send(rsp);
        })
    }

    #[tokio::test]
    async fn duplicate_call_dispatches_init_once_and_acks_both() {
        let handlers = CountingHandlers::new();
        let dispatch = InboundDispatch::new(Arc::clone(&handlers) as Arc<dyn Handlers>);
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatch.handle_call(create_call("req-a"), respond_into(tx.clone()));
        dispatch.handle_call(create_call("req-a"), respond_into(tx));

        let first = rx.recv().await.expect("first response");
        let second = rx.recv().await.expect("second response");
        assert_eq!(first.code, ErrorCode::ErrNone as i32);
        assert_eq!(second.code, ErrorCode::ErrNone as i32);
        tokio::task::yield_now().await;
        assert_eq!(handlers.inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_create_call_waits_for_initialization() {
        let handlers = CountingHandlers::new();
        let dispatch = InboundDispatch::new(Arc::clone(&handlers) as Arc<dyn Handlers>);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut plain = create_call("req-b");
        plain.is_create = false;
        dispatch.handle_call(plain, respond_into(tx));

        // the call is parked until the gate opens
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );

        assert!(dispatch.status().set_initializing());
        dispatch.status().set_initialized();
        let rsp = rx.recv().await.expect("gated response");
        assert_eq!(rsp.code, ErrorCode::ErrNone as i32);
        tokio::task::yield_now().await;
        assert_eq!(handlers.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_initialization_gates_later_calls_with_the_recorded_error() {
        let handlers = CountingHandlers::new();
        let dispatch = InboundDispatch::new(Arc::clone(&handlers) as Arc<dyn Handlers>);
        assert!(dispatch.status().set_initializing());
        dispatch
            .status()
            .set_initializing_failure(ErrorCode::ErrUserFunctionException, "ctor raised");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut plain = create_call("req-c");
        plain.is_create = false;
        dispatch.handle_call(plain, respond_into(tx));
        let rsp = rx.recv().await.expect("response");
        assert_eq!(rsp.code, ErrorCode::ErrUserFunctionException as i32);
        assert_eq!(rsp.message, "ctor raised");
        assert_eq!(handlers.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shutdown_handler_runs_at_most_once() {
        let handlers = CountingHandlers::new();
        let dispatch = InboundDispatch::new(Arc::clone(&handlers) as Arc<dyn Handlers>);
        let (tx, mut rx) = mpsc::unbounded_channel::<ShutdownRsp>();

        for _ in 0..2 {
            let tx = tx.clone();
            dispatch.handle_shutdown(
                ShutdownReq {
                    grace_period_second: 1,
                },
                Box::new(move |rsp| {
                    let _ = tx.send(rsp);
                }),
            );
        }
        let _ = rx.recv().await.expect("first shutdown rsp");
        let second = rx.recv().await.expect("second shutdown rsp");
        assert_eq!(second.code, ErrorCode::ErrNone as i32);
        assert_eq!(handlers.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wait_empty_returns_remaining_grace() {
        let set = ProcessingRequestSet::default();
        assert!(set.insert("r1"));
        assert!(!set.insert("r1"));

        let waiter = {
            let set = &set;
            async move { set.wait_empty(Duration::from_secs(5)).await }
        };
        let ((), remaining) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                assert!(set.remove("r1"));
            },
            waiter
        );
        assert!(remaining > Duration::ZERO);
    }
}
