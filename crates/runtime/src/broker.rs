// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! The request/response broker.
//!
//! Owns the table of outstanding calls keyed by request id, the retry and
//! timeout timers, and the dispatcher correlating inbound frames with
//! records. Every send first consults the stream registry for a direct
//! stream to the destination and falls back to the proxy stream.
//!
//! Timer tasks hold weak handles to both the broker and the record:
//! terminal settlement drops the strong reference and the timer observes
//! "gone" and aborts.

use crate::codes::{ErrorInfo, is_communication_code};
use crate::dispatch::InboundDispatch;
use crate::ids;
use crate::pool::ConnectionPool;
use crate::registry::StreamRegistry;
use crate::security::Security;
use crate::stream::{
    AckFn, ClientStreamOptions, Dispatcher, PeerCallback, PrewriteFn, StreamRw,
};
use fnbus_config::{BusConfig, FUNCTION_PROXY};
use fnbus_proto::proto::fnbus::v1::{
    CallResultAck, CallResultReq, CreateReq, CreateReqs, CreateRsp, CreateRsps, ExitReq, ExitRsp,
    InvokeReq, KillReq, KillRsp, LoadReq, LoadRsp, NotifyReq, RGroupReq, RGroupRsp, RouteInfo,
    SaveReq, SaveRsp, Signal, SignalReq, StreamMsg, stream_msg::Body,
};
use fnbus_proto::{ErrorCode, MsgKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// Fires exactly once with the settlement of a request's response phase;
/// returns whether the record should be erased.
type RespCallback = Box<dyn FnOnce(Result<StreamMsg, ErrorInfo>) -> bool + Send>;

/// Fires exactly once with the asynchronous completion notification.
type NotifyCallback = Box<dyn FnOnce(NotifyReq, bool) + Send>;

type Wired = Arc<Mutex<WiredRequest>>;

/// The asynchronous completion of a create or invoke.
#[derive(Debug)]
pub struct NotifyOutcome {
    /// The completion notification, possibly synthesized by the broker.
    pub notify: NotifyReq,
    /// True when the broker's timeout timer fabricated the notify.
    pub timed_out: bool,
}

/// Settlement handles for a create.
pub struct CreateTicket {
    /// Resolves with the acceptance response.
    pub response: oneshot::Receiver<CreateRsp>,
    /// Resolves with the completion notify.
    pub notify: oneshot::Receiver<NotifyOutcome>,
}

/// Settlement handles for a group create.
pub struct GroupCreateTicket {
    /// Resolves with the acceptance responses.
    pub response: oneshot::Receiver<CreateRsps>,
    /// Resolves with the completion notify.
    pub notify: oneshot::Receiver<NotifyOutcome>,
}

/// Settlement handle for an invoke; completion arrives as a notify.
pub struct InvokeTicket {
    /// Resolves with the completion notify.
    pub notify: oneshot::Receiver<NotifyOutcome>,
}

/// The outstanding-call record.
struct WiredRequest {
    request_id: String,
    dst_instance: String,
    payload: Body,
    callback: Option<RespCallback>,
    notify_callback: Option<NotifyCallback>,
    retry_count: u8,
    ack_received: bool,
    exponential_backoff: bool,
    remain_timeout_sec: i64,
    retry_interval_sec: u64,
    return_objects: usize,
    /// Route sends through the direct-path lookup instead of the proxy.
    direct_path: bool,
    /// Only register the record at prewrite time, and only when the ack is
    /// expected to return through the broker.
    register_on_prewrite: bool,
    /// Some of the results live in the data store, so the proxied ack path
    /// is required even on a direct stream.
    exist_obj_in_ds: bool,
    retry_timer: Option<AbortHandle>,
    timeout_timer: Option<AbortHandle>,
}

impl WiredRequest {
    fn new(request_id: String, dst_instance: String, payload: Body) -> Self {
        Self {
            request_id,
            dst_instance,
            payload,
            callback: None,
            notify_callback: None,
            retry_count: 0,
            ack_received: false,
            exponential_backoff: false,
            remain_timeout_sec: 0,
            retry_interval_sec: 0,
            return_objects: 0,
            direct_path: false,
            register_on_prewrite: false,
            exist_obj_in_ds: false,
            retry_timer: None,
            timeout_timer: None,
        }
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.timeout_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for WiredRequest {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

enum RetryStep {
    Stop,
    Expired {
        request_id: String,
        callback: Option<RespCallback>,
    },
    Resend(Duration),
}

/// The broker façade handed to the client surface.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

pub(crate) struct BrokerInner {
    instance_id: String,
    runtime_id: String,
    table: Mutex<HashMap<String, Wired>>,
    registry: Arc<StreamRegistry>,
    dispatch: Arc<InboundDispatch>,
    pool: Arc<ConnectionPool>,
    security: Option<Security>,
    ack_timeout_sec: u64,
    acc_max_sec: u64,
    peer_disconnect_timeout: Duration,
    backoff_min: Duration,
    backoff_max: Duration,
    direct_call: AtomicBool,
    /// Listening address advertised on outgoing call results.
    route: Mutex<Option<RouteInfo>>,
    resubscribe: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    stopped: AtomicBool,
}

impl Broker {
    /// Builds a broker over the given registry, dispatch and pool.
    #[must_use]
    pub(crate) fn new(
        cfg: &BusConfig,
        instance_id: String,
        runtime_id: String,
        registry: Arc<StreamRegistry>,
        dispatch: Arc<InboundDispatch>,
        pool: Arc<ConnectionPool>,
        security: Option<Security>,
    ) -> Self {
        if cfg.request_ack_acc_max_sec < cfg.request_ack_timeout_sec {
            warn!(
                "retry window ({}s) is smaller than the first retry interval ({}s); the interval is clamped",
                cfg.request_ack_acc_max_sec, cfg.request_ack_timeout_sec
            );
        }
        Broker {
            inner: Arc::new(BrokerInner {
                instance_id,
                runtime_id,
                table: Mutex::new(HashMap::new()),
                registry,
                dispatch,
                pool,
                security,
                ack_timeout_sec: cfg.request_ack_timeout_sec,
                acc_max_sec: cfg.request_ack_acc_max_sec,
                peer_disconnect_timeout: cfg.peer_disconnect_timeout(),
                backoff_min: cfg.reconnect_backoff_min(),
                backoff_max: cfg.reconnect_backoff_max(),
                direct_call: AtomicBool::new(cfg.direct_connection_enable),
                route: Mutex::new(None),
                resubscribe: Mutex::new(None),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<BrokerInner> {
        &self.inner
    }

    /// Turns the direct peer-to-peer path on.
    pub fn enable_direct_call(&self) {
        self.inner.direct_call.store(true, Ordering::Release);
    }

    /// Advertises this worker's serving address on outgoing call results.
    pub(crate) fn set_route(&self, server_ip: String, server_port: u16) {
        *self.inner.route.lock() = Some(RouteInfo {
            server_ip,
            server_port: i32::from(server_port),
        });
    }

    /// Installs the re-subscription hook fired after proxy reconnects.
    pub fn set_resubscribe(&self, cb: Arc<dyn Fn() + Send + Sync>) {
        *self.inner.resubscribe.lock() = Some(cb);
    }

    /// Sends a group create; the record survives the response to deliver
    /// the completion notify.
    pub fn group_create(&self, reqs: CreateReqs) -> GroupCreateTicket {
        let request_id = reqs.request_id.clone();
        let trace_id = reqs.trace_id.clone();
        let (resp_tx, resp_rx) = oneshot::channel();
        let (notify_tx, notify_rx) = oneshot::channel();

        let cb_request_id = request_id.clone();
        let callback: RespCallback = Box::new(move |result| {
            debug!("receive group create responses, request ID:{cb_request_id}, trace ID:{trace_id}");
            let (rsps, erase) = match result {
                Ok(msg) => match msg.body {
                    Some(Body::CreateRsps(rsps)) => {
                        let erase = rsps.code != ErrorCode::ErrNone as i32;
                        (rsps, erase)
                    }
                    _ => (
                        synth_create_rsps(&cb_request_id, &ErrorInfo::communication("unexpected response body")),
                        true,
                    ),
                },
                Err(err) => (synth_create_rsps(&cb_request_id, &err), true),
            };
            let _ = resp_tx.send(rsps);
            erase
        });
        let notify_callback: NotifyCallback = Box::new(move |notify, timed_out| {
            let _ = notify_tx.send(NotifyOutcome { notify, timed_out });
        });

        let wired = self.inner.register(
            request_id.clone(),
            FUNCTION_PROXY.to_owned(),
            Body::CreateReqs(reqs),
            Some(callback),
            Some(notify_callback),
        );
        self.inner.send_attempt(&wired);
        self.inner.setup_retry(&wired, false);
        GroupCreateTicket {
            response: resp_rx,
            notify: notify_rx,
        }
    }

    /// Sends a create. On success the record keeps the remote instance id
    /// so subsequent direct-call targeting works.
    pub fn create(&self, req: CreateReq, timeout: Option<Duration>) -> CreateTicket {
        let request_id = req.request_id.clone();
        let function = req.function.clone();
        let trace_id = req.trace_id.clone();
        let (resp_tx, resp_rx) = oneshot::channel();
        let (notify_tx, notify_rx) = oneshot::channel();

        let weak = Arc::downgrade(&self.inner);
        let cb_request_id = request_id.clone();
        let callback: RespCallback = Box::new(move |result| {
            debug!(
                "receive create response, function: {function}, request ID:{cb_request_id}, trace ID:{trace_id}"
            );
            let (rsp, erase) = match result {
                Ok(msg) => match msg.body {
                    Some(Body::CreateRsp(rsp)) => {
                        if rsp.code == ErrorCode::ErrNone as i32 {
                            if let Some(inner) = weak.upgrade() {
                                inner.update_remote(&cb_request_id, &rsp.instance_id);
                            }
                            (rsp, false)
                        } else {
                            (rsp, true)
                        }
                    }
                    _ => (
                        synth_create_rsp(&cb_request_id, &ErrorInfo::communication("unexpected response body")),
                        true,
                    ),
                },
                Err(err) => (synth_create_rsp(&cb_request_id, &err), true),
            };
            let _ = resp_tx.send(rsp);
            erase
        });
        let notify_callback: NotifyCallback = Box::new(move |notify, timed_out| {
            debug!(
                "receive create notify request, request ID:{}, error code: {}",
                notify.request_id, notify.code
            );
            let _ = notify_tx.send(NotifyOutcome { notify, timed_out });
        });

        let wired = self.inner.register(
            request_id.clone(),
            FUNCTION_PROXY.to_owned(),
            Body::CreateReq(req),
            Some(callback),
            Some(notify_callback),
        );
        self.inner.send_attempt(&wired);
        self.inner.setup_retry(&wired, false);
        if let Some(timeout) = timeout {
            self.inner.setup_notify_timeout(
                &wired,
                timeout,
                format!("create request timeout, requestId: {request_id}"),
                false,
            );
        }
        CreateTicket {
            response: resp_rx,
            notify: notify_rx,
        }
    }

    /// Sends an invoke. Uses the direct path when a direct stream to the
    /// destination exists; the response phase stays internal and failure is
    /// surfaced as a synthesized notify.
    pub fn invoke(&self, req: InvokeReq, timeout: Option<Duration>) -> InvokeTicket {
        let request_id = req.request_id.clone();
        let instance_id = req.instance_id.clone();
        let return_objects = req.return_object_ids.len();
        let (notify_tx, notify_rx) = oneshot::channel();

        // the response phase and the notify both settle through this slot;
        // whichever fires first wins
        let notify_slot = Arc::new(Mutex::new(Some(notify_tx)));

        let cb_request_id = request_id.clone();
        let cb_slot = Arc::clone(&notify_slot);
        let callback: RespCallback = Box::new(move |result| {
            let err = match result {
                Ok(msg) => match msg.body {
                    Some(Body::InvokeRsp(rsp)) => {
                        if rsp.code == ErrorCode::ErrNone as i32 {
                            return false;
                        }
                        ErrorInfo::new(rsp.code(), rsp.message)
                    }
                    _ => ErrorInfo::communication("unexpected response body"),
                },
                Err(err) => err,
            };
            error!(
                "invoke response failed, request id: {cb_request_id}, code: {}, msg: {}",
                err.code.as_str_name(),
                err.message
            );
            if let Some(tx) = cb_slot.lock().take() {
                let _ = tx.send(NotifyOutcome {
                    notify: NotifyReq {
                        code: err.code as i32,
                        message: format!(
                            "invoke response failed, request id: {cb_request_id}, msg: {}",
                            err.message
                        ),
                        request_id: cb_request_id.clone(),
                        ..Default::default()
                    },
                    timed_out: false,
                });
            }
            true
        });
        let ntf_slot = Arc::clone(&notify_slot);
        let notify_callback: NotifyCallback = Box::new(move |notify, timed_out| {
            if let Some(tx) = ntf_slot.lock().take() {
                let _ = tx.send(NotifyOutcome { notify, timed_out });
            }
        });

        let wired = self.inner.register(
            request_id.clone(),
            instance_id.clone(),
            Body::InvokeReq(req),
            Some(callback),
            Some(notify_callback),
        );
        {
            let mut wr = wired.lock();
            wr.direct_path = true;
            wr.return_objects = return_objects;
        }
        self.inner.send_attempt(&wired);
        self.inner.setup_retry(&wired, true);
        if let Some(timeout) = timeout {
            self.inner.setup_invoke_timeout(&wired, timeout, instance_id, request_id);
        }
        InvokeTicket { notify: notify_rx }
    }

    /// Returns a user result upstream. On a direct stream whose return
    /// objects are all inline, the record is never registered and the ack
    /// is fabricated locally.
    pub fn call_result(
        &self,
        mut req: CallResultReq,
        exist_obj_in_ds: bool,
    ) -> oneshot::Receiver<CallResultAck> {
        let request_id = req.request_id.clone();
        let instance_id = req.instance_id.clone();
        debug!(
            "start call result request, requestid: {request_id}, source instanceid: {instance_id}"
        );
        if self.inner.direct_call.load(Ordering::Acquire) {
            req.route_info = self.inner.route.lock().clone();
        }
        let (resp_tx, resp_rx) = oneshot::channel();
        let cb_request_id = request_id.clone();
        let callback: RespCallback = Box::new(move |result| {
            let ack = match result {
                Ok(msg) => match msg.body {
                    Some(Body::CallResultAck(ack)) => ack,
                    _ => synth_ack(&ErrorInfo::communication("unexpected response body")),
                },
                Err(err) => {
                    debug!(
                        "receive call result ack, request ID:{cb_request_id}, error code: {}, error message: {}",
                        err.code.as_str_name(),
                        err.message
                    );
                    synth_ack(&err)
                }
            };
            let _ = resp_tx.send(ack);
            true
        });

        let wired = self.inner.register_unsaved(
            request_id.clone(),
            instance_id,
            Body::CallResultReq(req),
            Some(callback),
            None,
        );
        {
            let mut wr = wired.lock();
            wr.direct_path = true;
            wr.register_on_prewrite = true;
            wr.exist_obj_in_ds = exist_obj_in_ds;
        }
        self.inner.send_attempt(&wired);
        self.inner.setup_retry(&wired, false);
        resp_rx
    }

    /// Kills an instance.
    pub fn kill(&self, req: KillReq, timeout: Option<Duration>) -> oneshot::Receiver<KillRsp> {
        let request_id = ids::gen_request_id();
        let (wired, rx) = self.inner.register_response_op(
            request_id.clone(),
            Body::KillReq(req),
            |msg| match msg.body {
                Some(Body::KillRsp(rsp)) => Some(rsp),
                _ => None,
            },
            |err| KillRsp {
                code: err.code as i32,
                message: err.message.clone(),
            },
        );
        self.inner.send_attempt(&wired);
        self.inner.setup_retry(&wired, false);
        if let Some(timeout) = timeout {
            self.inner.setup_response_timeout(
                &wired,
                timeout,
                format!("kill request timeout, requestId: {request_id}"),
            );
        }
        rx
    }

    /// Announces process exit.
    pub fn exit(&self, req: ExitReq) -> oneshot::Receiver<ExitRsp> {
        let request_id = ids::gen_request_id();
        let (wired, rx) = self.inner.register_response_op(
            request_id,
            Body::ExitReq(req),
            |msg| match msg.body {
                Some(Body::ExitRsp(rsp)) => Some(rsp),
                _ => None,
            },
            |err| ExitRsp {
                code: err.code as i32,
                message: err.message.clone(),
            },
        );
        self.inner.send_attempt(&wired);
        self.inner.setup_retry(&wired, false);
        rx
    }

    /// Saves instance state.
    pub fn state_save(&self, req: SaveReq) -> oneshot::Receiver<SaveRsp> {
        let request_id = ids::gen_request_id();
        let (wired, rx) = self.inner.register_response_op(
            request_id,
            Body::SaveReq(req),
            |msg| match msg.body {
                Some(Body::SaveRsp(rsp)) => Some(rsp),
                _ => None,
            },
            |err| SaveRsp {
                code: err.code as i32,
                message: err.message.clone(),
            },
        );
        self.inner.send_attempt(&wired);
        self.inner.setup_retry(&wired, false);
        rx
    }

    /// Loads instance state.
    pub fn state_load(&self, req: LoadReq) -> oneshot::Receiver<LoadRsp> {
        let request_id = ids::gen_request_id();
        let (wired, rx) = self.inner.register_response_op(
            request_id,
            Body::LoadReq(req),
            |msg| match msg.body {
                Some(Body::LoadRsp(rsp)) => Some(rsp),
                _ => None,
            },
            |err| LoadRsp {
                code: err.code as i32,
                message: err.message.clone(),
                state: Vec::new(),
            },
        );
        self.inner.send_attempt(&wired);
        self.inner.setup_retry(&wired, false);
        rx
    }

    /// Creates a resource group.
    pub fn create_rgroup(
        &self,
        req: RGroupReq,
        timeout: Option<Duration>,
    ) -> oneshot::Receiver<RGroupRsp> {
        let request_id = req.request_id.clone();
        let (wired, rx) = self.inner.register_response_op(
            request_id.clone(),
            Body::RGroupReq(req),
            |msg| match msg.body {
                Some(Body::RGroupRsp(rsp)) => Some(rsp),
                _ => None,
            },
            |err| RGroupRsp {
                code: err.code as i32,
                message: err.message.clone(),
                group_id: String::new(),
            },
        );
        self.inner.send_attempt(&wired);
        self.inner.setup_retry(&wired, false);
        if let Some(timeout) = timeout {
            self.inner.setup_response_timeout(
                &wired,
                timeout,
                format!("create resource group request timeout, requestId: {request_id}"),
            );
        }
        rx
    }

    /// Fails every outstanding request with `ERR_FINALIZED` and cancels all
    /// timers. Called on shutdown.
    pub fn clear(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.clear_all();
    }

    /// Drops the direct stream to an instance.
    pub fn remove_peer_stream(&self, instance_id: &str) {
        debug!("{instance_id} remove peer stream");
        self.inner.registry.remove(instance_id);
    }

    /// Number of outstanding wired requests; test and drain observability.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.table.lock().len()
    }
}

impl BrokerInner {
    fn register(
        self: &Arc<Self>,
        request_id: String,
        dst_instance: String,
        payload: Body,
        callback: Option<RespCallback>,
        notify_callback: Option<NotifyCallback>,
    ) -> Wired {
        let wired = self.register_unsaved(request_id.clone(), dst_instance, payload, callback, notify_callback);
        self.save_wired(&request_id, &wired);
        wired
    }

    fn register_unsaved(
        self: &Arc<Self>,
        request_id: String,
        dst_instance: String,
        payload: Body,
        callback: Option<RespCallback>,
        notify_callback: Option<NotifyCallback>,
    ) -> Wired {
        let mut wr = WiredRequest::new(request_id, dst_instance, payload);
        wr.callback = callback;
        wr.notify_callback = notify_callback;
        Arc::new(Mutex::new(wr))
    }

    fn register_response_op<T: Send + 'static>(
        self: &Arc<Self>,
        request_id: String,
        payload: Body,
        project: fn(StreamMsg) -> Option<T>,
        synthesize: fn(&ErrorInfo) -> T,
    ) -> (Wired, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let callback: RespCallback = Box::new(move |result| {
            let rsp = match result {
                Ok(msg) => project(msg).unwrap_or_else(|| {
                    synthesize(&ErrorInfo::communication("unexpected response body"))
                }),
                Err(err) => synthesize(&err),
            };
            let _ = tx.send(rsp);
            true
        });
        let wired = self.register(
            request_id,
            FUNCTION_PROXY.to_owned(),
            payload,
            Some(callback),
            None,
        );
        (wired, rx)
    }

    /// Inserts the record; a duplicate save bumps the retry count on the
    /// existing record instead of replacing it.
    ///
    /// The table lock is never held while a record lock is taken; every
    /// record access happens on a clone taken after the table is released.
    fn save_wired(self: &Arc<Self>, request_id: &str, wired: &Wired) {
        let existing = {
            let mut table = self.table.lock();
            match table.get(request_id) {
                Some(entry) if !Arc::ptr_eq(entry, wired) => Some(Arc::clone(entry)),
                Some(_) => None,
                None => {
                    let _ = table.insert(request_id.to_owned(), Arc::clone(wired));
                    debug!("saved wired request {request_id}");
                    None
                }
            }
        };
        if let Some(existing) = existing {
            let mut wr = existing.lock();
            wr.retry_count = wr.retry_count.wrapping_add(1);
        }
    }

    /// Removes the record and cancels its timers.
    fn erase_wired(&self, request_id: &str) -> Option<Wired> {
        let wired = self.table.lock().remove(request_id)?;
        wired.lock().cancel_timers();
        Some(wired)
    }

    fn update_remote(&self, request_id: &str, dst_instance: &str) {
        let wired = self.table.lock().get(request_id).cloned();
        if let Some(wired) = wired {
            wired.lock().dst_instance = dst_instance.to_owned();
        }
    }

    // ---- send paths -----------------------------------------------------

    /// Serializes the current attempt and hands it to the right stream.
    fn send_attempt(self: &Arc<Self>, wired: &Wired) {
        let (msg, dst, direct_path, register_on_prewrite, exist_obj, request_id) = {
            let wr = wired.lock();
            let message_id = ids::gen_message_id(&wr.request_id, wr.retry_count);
            (
                StreamMsg::wrap(message_id, wr.payload.clone()),
                wr.dst_instance.clone(),
                wr.direct_path,
                wr.register_on_prewrite,
                wr.exist_obj_in_ds,
                wr.request_id.clone(),
            )
        };
        debug!("send attempt for request {request_id}, message id {}", msg.message_id);

        if !direct_path {
            let weak = Arc::downgrade(self);
            let ack_request_id = request_id;
            self.write_proxy(
                msg,
                Box::new(move |_, res| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_write_result(&ack_request_id, res);
                    }
                }),
            );
            return;
        }

        let prewrite: Option<PrewriteFn> = if register_on_prewrite {
            let weak = Arc::downgrade(self);
            let wired = Arc::clone(wired);
            let prewrite_id = request_id.clone();
            Some(Box::new(move |is_direct| {
                if is_direct && !exist_obj {
                    return;
                }
                if let Some(inner) = weak.upgrade() {
                    inner.save_wired(&prewrite_id, &wired);
                }
            }))
        } else {
            None
        };

        let is_call_result = matches!(
            wired.lock().payload,
            Body::CallResultReq(_)
        );
        let ack: AckFn = if is_call_result {
            let weak = Arc::downgrade(self);
            let wired = Arc::clone(wired);
            Box::new(move |is_direct, res| {
                let Some(inner) = weak.upgrade() else { return };
                if !is_direct || exist_obj {
                    let request_id = wired.lock().request_id.clone();
                    inner.on_write_result(&request_id, res);
                    return;
                }
                match res {
                    Err(err) if err.is_communication() => {
                        let request_id = wired.lock().request_id.clone();
                        error!(
                            "communicate fails for request({request_id}) errcode({}), msg({})",
                            err.code.as_str_name(),
                            err.message
                        );
                        inner.save_wired(&request_id, &wired);
                    }
                    res => {
                        // no ack will return through the broker: settle here
                        let request_id = wired.lock().request_id.clone();
                        let _ = inner.erase_wired(&request_id);
                        let callback = wired.lock().callback.take();
                        if let Some(callback) = callback {
                            let settled = res.map(|()| {
                                StreamMsg::wrap(
                                    String::new(),
                                    CallResultAck {
                                        code: ErrorCode::ErrNone as i32,
                                        message: String::new(),
                                    },
                                )
                            });
                            let _ = callback(settled);
                        }
                    }
                }
            })
        } else {
            let weak = Arc::downgrade(self);
            let ack_request_id = request_id;
            Box::new(move |is_direct, res| {
                if is_direct && res.is_ok() {
                    // acceptance on the direct stream; the real response
                    // arrives translated on the same stream
                    return;
                }
                if let Some(inner) = weak.upgrade() {
                    inner.on_write_result(&ack_request_id, res);
                }
            })
        };
        self.try_direct_write(&dst, msg, ack, prewrite);
    }

    /// Write on the proxy stream.
    fn write_proxy(&self, msg: StreamMsg, ack: AckFn) {
        match self.registry.proxy() {
            Some(stream) => stream.write(msg, Some(ack), None),
            None => ack(false, Err(ErrorInfo::communication("bus client is unavailable"))),
        }
    }

    /// Write on the direct stream for `dst`, degrading to the proxy.
    fn try_direct_write(&self, dst: &str, msg: StreamMsg, ack: AckFn, prewrite: Option<PrewriteFn>) {
        match self.registry.get(dst) {
            Some(stream) => stream.write(msg, Some(ack), prewrite),
            None => {
                if let Some(prewrite) = prewrite {
                    prewrite(false);
                }
                ack(false, Err(ErrorInfo::communication("bus client is unavailable")));
            }
        }
    }

    /// Handles a write acknowledgement: communication errors feed the retry
    /// loop, anything else settles the record immediately.
    fn on_write_result(&self, request_id: &str, res: Result<(), ErrorInfo>) {
        let err = match res {
            Ok(()) => return,
            Err(err) => err,
        };
        if err.is_communication() {
            error!(
                "communicate fails for request({request_id}) errcode({}), msg({})",
                err.code.as_str_name(),
                err.message
            );
            return;
        }
        debug!(
            "send request failed for request: {request_id}, err code is {}, err msg is {}",
            err.code.as_str_name(),
            err.message
        );
        if let Some(wired) = self.erase_wired(request_id) {
            let callback = wired.lock().callback.take();
            if let Some(callback) = callback {
                let _ = callback(Err(err));
            }
        }
    }

    // ---- retry / timeout ------------------------------------------------

    fn initial_retry_interval(&self) -> u64 {
        self.ack_timeout_sec.min(self.acc_max_sec)
    }

    fn setup_retry(self: &Arc<Self>, wired: &Wired, exponential_backoff: bool) {
        let initial = self.initial_retry_interval();
        {
            let mut wr = wired.lock();
            wr.retry_interval_sec = initial;
            wr.remain_timeout_sec = self.acc_max_sec as i64;
            wr.exponential_backoff = exponential_backoff;
        }
        self.arm_retry_timer(wired, Duration::from_secs(initial));
    }

    fn arm_retry_timer(self: &Arc<Self>, wired: &Wired, first_delay: Duration) {
        let weak_inner = Arc::downgrade(self);
        let weak_wired = Arc::downgrade(wired);
        let handle = tokio::spawn(async move {
            let mut delay = first_delay;
            loop {
                tokio::time::sleep(delay).await;
                let (Some(inner), Some(wired)) = (weak_inner.upgrade(), weak_wired.upgrade())
                else {
                    return;
                };
                match inner.evaluate_retry(&wired) {
                    RetryStep::Stop => return,
                    RetryStep::Expired {
                        request_id,
                        callback,
                    } => {
                        error!("rpc request retry expired, request ID: {request_id}");
                        if let Some(callback) = callback {
                            let _ = callback(Err(ErrorInfo::new(
                                ErrorCode::ErrRequestBetweenRuntimeBus,
                                format!("Response timeout, request ID is {request_id}"),
                            )));
                        }
                        return;
                    }
                    RetryStep::Resend(next) => {
                        inner.send_attempt(&wired);
                        delay = next;
                    }
                }
            }
        });
        wired.lock().retry_timer = Some(handle.abort_handle());
    }

    /// One retry tick: stop on ack, expire when the window ran out,
    /// otherwise compute the next interval and resend.
    fn evaluate_retry(self: &Arc<Self>, wired: &Wired) -> RetryStep {
        let request_id = wired.lock().request_id.clone();
        let in_table = self.table.lock().contains_key(&request_id);
        let mut wr = wired.lock();
        if wr.ack_received {
            debug!("{} has received ack, no need retry", wr.request_id);
            return RetryStep::Stop;
        }
        if !in_table {
            // settled, or a direct call result whose ack never needed the
            // broker
            return RetryStep::Stop;
        }
        wr.retry_count = wr.retry_count.wrapping_add(1);
        wr.remain_timeout_sec -= wr.retry_interval_sec as i64;
        if wr.remain_timeout_sec <= 0 {
            let request_id = wr.request_id.clone();
            let callback = wr.callback.take();
            if let Some(timer) = wr.timeout_timer.take() {
                timer.abort();
            }
            drop(wr);
            let _ = self.table.lock().remove(&request_id);
            return RetryStep::Expired {
                request_id,
                callback,
            };
        }
        if wr.exponential_backoff {
            wr.retry_interval_sec *= 2;
        }
        if wr.retry_interval_sec as i64 > wr.remain_timeout_sec {
            wr.retry_interval_sec = wr.remain_timeout_sec as u64;
        }
        info!(
            "req {} will retry without ack, count: {}",
            wr.request_id, wr.retry_count
        );
        RetryStep::Resend(Duration::from_secs(wr.retry_interval_sec))
    }

    /// Arms the one-shot timeout that settles create-style ops through the
    /// notify callback.
    fn setup_notify_timeout(
        self: &Arc<Self>,
        wired: &Wired,
        timeout: Duration,
        message: String,
        timed_out_flag: bool,
    ) {
        let weak_inner = Arc::downgrade(self);
        let weak_wired = Arc::downgrade(wired);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let (Some(inner), Some(wired)) = (weak_inner.upgrade(), weak_wired.upgrade()) else {
                return;
            };
            let request_id = wired.lock().request_id.clone();
            if inner.table.lock().contains_key(&request_id) {
                let notify_callback = {
                    let mut wr = wired.lock();
                    wr.ack_received = false;
                    wr.notify_callback.take()
                };
                error!("request timeout, start exec notify callback, request ID:{request_id}");
                if let Some(callback) = notify_callback {
                    callback(
                        NotifyReq {
                            code: ErrorCode::ErrInnerSystemError as i32,
                            message: message.clone(),
                            request_id: request_id.clone(),
                            ..Default::default()
                        },
                        timed_out_flag,
                    );
                }
                let _ = inner.erase_wired(&request_id);
            }
        });
        wired.lock().timeout_timer = Some(handle.abort_handle());
    }

    /// Invoke timeout: synthesized notify plus an out-of-band signal so the
    /// peer can unblock whatever thread was waiting.
    fn setup_invoke_timeout(
        self: &Arc<Self>,
        wired: &Wired,
        timeout: Duration,
        instance_id: String,
        request_id: String,
    ) {
        let weak_inner = Arc::downgrade(self);
        let weak_wired = Arc::downgrade(wired);
        let timeout_secs = timeout.as_secs();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let (Some(inner), Some(wired)) = (weak_inner.upgrade(), weak_wired.upgrade()) else {
                return;
            };
            if !inner.table.lock().contains_key(&request_id) {
                return;
            }
            let notify_callback = {
                let mut wr = wired.lock();
                wr.ack_received = false;
                wr.notify_callback.take()
            };
            error!(
                "request timeout with {timeout_secs} s, instance: {instance_id}, request ID:{request_id}"
            );
            if let Some(callback) = notify_callback {
                callback(
                    NotifyReq {
                        code: ErrorCode::ErrInnerSystemError as i32,
                        message: format!(
                            "invoke request timeout with {timeout_secs} s, requestId: {request_id}"
                        ),
                        request_id: request_id.clone(),
                        ..Default::default()
                    },
                    true,
                );
            }
            let _ = inner.erase_wired(&request_id);
            inner.send_erase_pending_signal(&instance_id, &request_id);
        });
        wired.lock().timeout_timer = Some(handle.abort_handle());
    }

    /// Arms the one-shot timeout for response-settled ops (kill, rgroup).
    fn setup_response_timeout(self: &Arc<Self>, wired: &Wired, timeout: Duration, message: String) {
        let weak_inner = Arc::downgrade(self);
        let weak_wired = Arc::downgrade(wired);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let (Some(inner), Some(wired)) = (weak_inner.upgrade(), weak_wired.upgrade()) else {
                return;
            };
            let request_id = wired.lock().request_id.clone();
            if inner.table.lock().contains_key(&request_id) {
                error!("request timeout, start exec callback, request ID : {request_id}");
                let callback = wired.lock().callback.take();
                if let Some(callback) = callback {
                    let _ = callback(Err(ErrorInfo::new(
                        ErrorCode::ErrInnerSystemError,
                        message.clone(),
                    )));
                }
                let _ = inner.erase_wired(&request_id);
            }
        });
        wired.lock().timeout_timer = Some(handle.abort_handle());
    }

    /// Tells the peer to drop the thread parked on a timed-out request.
    fn send_erase_pending_signal(self: &Arc<Self>, instance_id: &str, request_id: &str) {
        debug!("send erase-pending signal to {instance_id} for request {request_id}");
        let signal = SignalReq {
            instance_id: instance_id.to_owned(),
            request_id: request_id.to_owned(),
            signal: Signal::ErasePendingThread as i32,
            payload: Vec::new(),
        };
        let msg = StreamMsg::wrap(ids::gen_message_id(&ids::gen_request_id(), 0), signal);
        self.try_direct_write(
            instance_id,
            msg,
            Box::new(move |_, res| {
                if let Err(err) = res {
                    warn!("failed to send erase-pending signal: {err}");
                }
            }),
            None,
        );
    }

    // ---- reconnect-driven paths ----------------------------------------

    /// Resends outstanding records after a reconnect.
    ///
    /// On a direct-peer reconnect only that peer's records are resent (with
    /// retry re-armed). On a proxy reconnect records whose direct stream is
    /// alive are left alone, and the re-subscription hook fires.
    pub(crate) fn resend_requests(self: &Arc<Self>, reconnected: &str) {
        let snapshot: Vec<Wired> = {
            let table = self.table.lock();
            info!("current wired requests size: {}", table.len());
            table.values().cloned().collect()
        };
        let mut resend_plain = Vec::new();
        let mut resend_with_retry = Vec::new();
        for wired in snapshot {
            let dst = wired.lock().dst_instance.clone();
            if reconnected != FUNCTION_PROXY && dst != reconnected {
                continue;
            }
            if reconnected == FUNCTION_PROXY {
                if let Some(direct) = self.registry.try_get(&dst) {
                    if direct.available() {
                        continue;
                    }
                }
                resend_plain.push(wired);
            } else {
                debug!("direct call client {reconnected} reconnected, resend with retry");
                resend_with_retry.push(wired);
            }
        }
        for wired in resend_plain {
            self.send_attempt(&wired);
        }
        for wired in resend_with_retry {
            {
                let mut wr = wired.lock();
                wr.ack_received = false;
                if let Some(timer) = wr.retry_timer.take() {
                    timer.abort();
                }
            }
            self.send_attempt(&wired);
            let delay = Duration::from_secs(self.initial_retry_interval());
            self.arm_retry_timer(&wired, delay);
        }
        let resubscribe = self.resubscribe.lock().clone();
        if let Some(cb) = resubscribe {
            cb();
        }
    }

    /// A stream stayed down past its grace window.
    ///
    /// For a direct peer the records are pushed back through the proxy a
    /// moment later; for the proxy every record without a live direct
    /// stream is failed with `ERR_BUS_DISCONNECTION`.
    pub(crate) fn notify_disconnected(self: &Arc<Self>, peer: &str) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        if peer != FUNCTION_PROXY {
            warn!("{peer} disconnected, defer to resend requests");
            let weak = Arc::downgrade(self);
            let peer = peer.to_owned();
            let _ = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if let Some(inner) = weak.upgrade() {
                    inner.resend_requests(&peer);
                }
            });
            return;
        }
        debug!("proxy reconnect timeout, pop remained reqs and set error");
        let snapshot: Vec<(String, Wired)> = {
            let table = self.table.lock();
            table
                .iter()
                .map(|(id, wired)| (id.clone(), Arc::clone(wired)))
                .collect()
        };
        for (request_id, wired) in snapshot {
            let (dst, notify_callback) = {
                let mut wr = wired.lock();
                (wr.dst_instance.clone(), wr.notify_callback.take())
            };
            let direct_alive = self
                .registry
                .try_get(&dst)
                .is_some_and(|s| s.available());
            match notify_callback {
                Some(callback) if !direct_alive => {
                    callback(
                        NotifyReq {
                            code: ErrorCode::ErrBusDisconnection as i32,
                            message: "connected lost from proxy".to_owned(),
                            request_id: request_id.clone(),
                            ..Default::default()
                        },
                        false,
                    );
                    let _ = self.erase_wired(&request_id);
                }
                Some(callback) => {
                    // direct stream still alive; put the callback back
                    wired.lock().notify_callback = Some(callback);
                }
                None => {}
            }
        }
    }

    fn clear_all(&self) {
        let drained: Vec<(String, Wired)> = self.table.lock().drain().collect();
        for (request_id, wired) in drained {
            let callback = {
                let mut wr = wired.lock();
                wr.cancel_timers();
                wr.callback.take()
            };
            if let Some(callback) = callback {
                let _ = callback(Err(ErrorInfo::finalized("Function bus client quit")));
            }
            debug!("finalized wired request {request_id}");
        }
    }

    // ---- inbound dispatch ----------------------------------------------

    /// Dispatcher for the proxy stream: the full handler table.
    pub(crate) fn proxy_dispatcher(self: &Arc<Self>) -> Dispatcher {
        let weak = Arc::downgrade(self);
        Arc::new(move |from, msg| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch_inbound(from, msg, false);
            }
        })
    }

    /// Dispatcher for direct peer streams: the reduced table.
    pub(crate) fn direct_dispatcher(self: &Arc<Self>) -> Dispatcher {
        let weak = Arc::downgrade(self);
        Arc::new(move |from, msg| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch_inbound(from, msg, true);
            }
        })
    }

    fn dispatch_inbound(self: &Arc<Self>, from: &str, msg: StreamMsg, direct: bool) {
        let Some(kind) = msg.kind() else {
            error!("received message without body from {from}");
            return;
        };
        let allowed = if direct {
            matches!(
                kind,
                MsgKind::CallReq | MsgKind::InvokeRsp | MsgKind::NotifyReq | MsgKind::CallResultAck
            )
        } else {
            true
        };
        if !allowed {
            error!("invalid received message body type {kind:?} from {from}");
            return;
        }
        match kind {
            MsgKind::CallReq => self.recv_call(from, msg),
            MsgKind::NotifyReq => self.recv_notify(from, msg),
            MsgKind::CheckpointReq => self.recv_checkpoint(msg),
            MsgKind::RecoverReq => self.recv_recover(msg),
            MsgKind::ShutdownReq => self.recv_shutdown(msg),
            MsgKind::SignalReq => self.recv_signal(msg),
            MsgKind::HeartbeatReq => self.recv_heartbeat(msg),
            MsgKind::CreateRsp | MsgKind::CreateRsps | MsgKind::InvokeRsp => {
                self.recv_phase_response(msg);
            }
            MsgKind::CallResultAck
            | MsgKind::KillRsp
            | MsgKind::SaveRsp
            | MsgKind::LoadRsp
            | MsgKind::RGroupRsp
            | MsgKind::ExitRsp => self.recv_final_response(msg),
            other => {
                error!("invalid received message body type {other:?} from {from}");
            }
        }
    }

    fn recv_call(self: &Arc<Self>, from: &str, msg: StreamMsg) {
        let message_id = msg.message_id;
        let Some(Body::CallReq(call)) = msg.body else {
            return;
        };
        let respond = self.direct_responder(message_id, from.to_owned(), false);
        self.dispatch
            .handle_call(call, Box::new(move |rsp| respond(Body::CallRsp(rsp))));
    }

    fn recv_notify(self: &Arc<Self>, from: &str, msg: StreamMsg) {
        let message_id = msg.message_id;
        let Some(Body::NotifyReq(notify)) = msg.body else {
            return;
        };
        let request_id = notify.request_id.clone();
        debug!("recv notify request, req id:{request_id}");
        let wired = self.erase_wired(&request_id);

        let mut exist_obj_in_ds = false;
        let mut notify_callback = None;
        if let Some(wired) = &wired {
            let mut wr = wired.lock();
            exist_obj_in_ds = notify.small_objects.len() != wr.return_objects;
            notify_callback = wr.notify_callback.take();
            let dst = wr.dst_instance.clone();
            drop(wr);
            if dst != FUNCTION_PROXY
                && self.direct_call.load(Ordering::Acquire)
                && notify
                    .route_info
                    .as_ref()
                    .is_some_and(|r| !r.server_ip.is_empty())
            {
                self.new_peer_stream(&dst, notify.route_info.clone().unwrap_or_default());
            }
        }

        let respond = self.direct_responder(message_id, from.to_owned(), exist_obj_in_ds);
        self.dispatch.handle_notify(
            Box::new(move || {
                if let Some(callback) = notify_callback {
                    callback(notify, false);
                }
                Default::default()
            }),
            Box::new(move |rsp| respond(Body::NotifyRsp(rsp))),
        );
    }

    fn recv_checkpoint(self: &Arc<Self>, msg: StreamMsg) {
        let message_id = msg.message_id;
        let Some(Body::CheckpointReq(req)) = msg.body else {
            return;
        };
        let respond = self.proxy_responder(message_id);
        self.dispatch
            .handle_checkpoint(req, Box::new(move |rsp| respond(Body::CheckpointRsp(rsp))));
    }

    fn recv_recover(self: &Arc<Self>, msg: StreamMsg) {
        let message_id = msg.message_id;
        let Some(Body::RecoverReq(req)) = msg.body else {
            return;
        };
        let respond = self.proxy_responder(message_id);
        self.dispatch
            .handle_recover(req, Box::new(move |rsp| respond(Body::RecoverRsp(rsp))));
    }

    fn recv_shutdown(self: &Arc<Self>, msg: StreamMsg) {
        let message_id = msg.message_id;
        let Some(Body::ShutdownReq(req)) = msg.body else {
            return;
        };
        debug!(
            "shutdown request, message id: {message_id}, grace period second: {}",
            req.grace_period_second
        );
        let respond = self.proxy_responder(message_id);
        self.dispatch
            .handle_shutdown(req, Box::new(move |rsp| respond(Body::ShutdownRsp(rsp))));
    }

    fn recv_signal(self: &Arc<Self>, msg: StreamMsg) {
        let message_id = msg.message_id;
        let Some(Body::SignalReq(req)) = msg.body else {
            return;
        };
        let respond = self.proxy_responder(message_id);
        self.dispatch
            .handle_signal(req, Box::new(move |rsp| respond(Body::SignalRsp(rsp))));
    }

    fn recv_heartbeat(self: &Arc<Self>, msg: StreamMsg) {
        let message_id = msg.message_id;
        let Some(Body::HeartbeatReq(req)) = msg.body else {
            return;
        };
        let respond = self.proxy_responder(message_id);
        self.dispatch
            .handle_heartbeat(req, Box::new(move |rsp| respond(Body::HeartbeatRsp(rsp))));
    }

    /// A response that keeps the record when the callback asks to (creates
    /// and invokes await their notify).
    fn recv_phase_response(self: &Arc<Self>, msg: StreamMsg) {
        let request_id = ids::request_id_of(&msg.message_id).to_owned();
        debug!(
            "receive create or invoke response, msg id {}, req id {request_id}",
            msg.message_id
        );
        if needs_resend(&msg) {
            debug!("response has communication error, retry will resend, message id {}", msg.message_id);
            return;
        }
        let wired = self.table.lock().get(&request_id).cloned();
        let callback = wired.and_then(|wired| {
            let mut wr = wired.lock();
            wr.ack_received = true;
            wr.callback.take()
        });
        let Some(callback) = callback else { return };
        let weak = Arc::downgrade(self);
        self.dispatch.handle_response(Box::pin(async move {
            if callback(Ok(msg)) {
                if let Some(inner) = weak.upgrade() {
                    let _ = inner.erase_wired(&request_id);
                }
            }
        }));
    }

    /// A response that always settles the record.
    fn recv_final_response(self: &Arc<Self>, msg: StreamMsg) {
        let request_id = ids::request_id_of(&msg.message_id).to_owned();
        debug!("receive response for req id {request_id}");
        if needs_resend(&msg) {
            debug!("response has communication error, retry will resend, message id {}", msg.message_id);
            return;
        }
        let Some(wired) = self.erase_wired(&request_id) else {
            return;
        };
        let callback = wired.lock().callback.take();
        let Some(callback) = callback else { return };
        self.dispatch.handle_response(Box::pin(async move {
            let _ = callback(Ok(msg));
        }));
    }

    /// Answers an inbound request on the stream it arrived on. On direct
    /// streams, responses are skipped unless the ack has to travel the
    /// proxied path.
    fn direct_responder(
        self: &Arc<Self>,
        message_id: String,
        from: String,
        exist_obj_in_ds: bool,
    ) -> impl FnOnce(Body) + Send + 'static {
        let weak = Arc::downgrade(self);
        move |body| {
            if from != FUNCTION_PROXY && !exist_obj_in_ds {
                // the direct path does not ack
                return;
            }
            let Some(inner) = weak.upgrade() else { return };
            let msg = StreamMsg {
                message_id: message_id.clone(),
                body: Some(body),
            };
            let warn_id = message_id;
            let warn_from = from.clone();
            inner.try_direct_write(
                &from,
                msg,
                Box::new(move |_, res| {
                    if let Err(err) = res {
                        warn!("failed to send resp {warn_id} to {warn_from}, err: {err}");
                    }
                }),
                None,
            );
        }
    }

    /// Answers an inbound request on the proxy stream.
    fn proxy_responder(self: &Arc<Self>, message_id: String) -> impl FnOnce(Body) + Send + 'static {
        let weak = Arc::downgrade(self);
        move |body| {
            let Some(inner) = weak.upgrade() else { return };
            inner.write_proxy(
                StreamMsg {
                    message_id,
                    body: Some(body),
                },
                Box::new(|_, res| {
                    if let Err(err) = res {
                        warn!("failed to send response: {err}");
                    }
                }),
            );
        }
    }

    /// Opens a direct stream back to a peer that advertised its serving
    /// address on a notify.
    fn new_peer_stream(self: &Arc<Self>, dst: &str, route: RouteInfo) {
        if self
            .registry
            .try_get(dst)
            .is_some_and(|s| s.available())
        {
            return;
        }
        let weak = Arc::downgrade(self);
        let dst = dst.to_owned();
        let src = self.instance_id.clone();
        let runtime_id = self.runtime_id.clone();
        let pool = Arc::clone(&self.pool);
        let security = self.security.clone();
        let timeout = self.peer_disconnect_timeout;
        let (backoff_min, backoff_max) = (self.backoff_min, self.backoff_max);
        let _ = tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else { return };
            let resend: PeerCallback = {
                let weak = Arc::downgrade(&inner);
                Arc::new(move |peer: &str| {
                    if let Some(inner) = weak.upgrade() {
                        inner.resend_requests(peer);
                    }
                })
            };
            let disconnected: PeerCallback = {
                let weak = Arc::downgrade(&inner);
                Arc::new(move |peer: &str| {
                    if let Some(inner) = weak.upgrade() {
                        inner.notify_disconnected(peer);
                    }
                })
            };
            let opts = ClientStreamOptions {
                ip: route.server_ip.clone(),
                port: route.server_port as u16,
                disconnected_timeout: timeout,
                backoff_min,
                backoff_max,
                security,
                resend_cb: Some(resend),
                disconnected_cb: Some(disconnected),
                discover_cb: None,
            };
            match StreamRw::connect_client(
                src,
                dst.clone(),
                runtime_id,
                pool,
                opts,
                inner.direct_dispatcher(),
            )
            .await
            {
                Ok(stream) => {
                    let _ = inner.registry.emplace(&dst, stream);
                }
                Err(err) => {
                    warn!("failed to open direct stream to {dst}: {err}");
                }
            }
        });
    }
}

/// Mirrors the table of response kinds whose embedded communication error
/// means "keep retrying" instead of settling.
fn needs_resend(msg: &StreamMsg) -> bool {
    let code = match &msg.body {
        Some(Body::CreateRsp(rsp)) => rsp.code(),
        Some(Body::CreateRsps(rsp)) => rsp.code(),
        Some(Body::InvokeRsp(rsp)) => rsp.code(),
        Some(Body::CallResultAck(rsp)) => rsp.code(),
        Some(Body::KillRsp(rsp)) => rsp.code(),
        Some(Body::SaveRsp(rsp)) => rsp.code(),
        Some(Body::LoadRsp(rsp)) => rsp.code(),
        Some(Body::RGroupRsp(rsp)) => rsp.code(),
        Some(Body::ExitRsp(_)) => return false,
        _ => {
            error!("response body does not match, messageid: {}", msg.message_id);
            return false;
        }
    };
    is_communication_code(code)
}

fn synth_create_rsp(request_id: &str, err: &ErrorInfo) -> CreateRsp {
    CreateRsp {
        code: err.code as i32,
        message: format!("create response failed, request id: {request_id}, msg: {}", err.message),
        instance_id: String::new(),
        request_id: request_id.to_owned(),
    }
}

fn synth_create_rsps(request_id: &str, err: &ErrorInfo) -> CreateRsps {
    CreateRsps {
        code: err.code as i32,
        message: format!(
            "create group response failed, request id: {request_id}, msg: {}",
            err.message
        ),
        responses: Vec::new(),
    }
}

fn synth_ack(err: &ErrorInfo) -> CallResultAck {
    CallResultAck {
        code: err.code as i32,
        message: err.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Handlers;
    use fnbus_proto::proto::fnbus::v1::{
        CallReq, CheckpointReq, CheckpointRsp, RecoverReq, RecoverRsp, ShutdownReq, ShutdownRsp,
        SignalRsp,
    };

    struct NoopHandlers;

    #[async_trait::async_trait]
    impl Handlers for NoopHandlers {
        async fn init(&self, _call: CallReq) {}
        async fn call(&self, _call: CallReq) {}
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
            SignalRsp::default()
        }
    }

    fn test_broker(acc_max_sec: u64) -> Broker {
        let mut cfg = BusConfig::default();
        cfg.request_ack_timeout_sec = 1;
        cfg.request_ack_acc_max_sec = acc_max_sec;
        Broker::new(
            &cfg,
            "driver-job-1".to_owned(),
            "rt-1".to_owned(),
            Arc::new(StreamRegistry::default()),
            Arc::new(InboundDispatch::new(Arc::new(NoopHandlers))),
            Arc::new(ConnectionPool::new(&cfg)),
            None,
        )
    }

    fn create_req(request_id: &str) -> CreateReq {
        CreateReq {
            request_id: request_id.to_owned(),
            function: "f".to_owned(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_window_expiry_settles_with_bus_error() {
        let broker = test_broker(3);
        let request_id = ids::gen_request_id();
        let ticket = broker.create(create_req(&request_id), None);

        let rsp = ticket.response.await.expect("response must settle");
        assert_eq!(rsp.code(), ErrorCode::ErrRequestBetweenRuntimeBus);
        assert!(rsp.message.contains(&request_id));
        assert_eq!(broker.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invoke_timeout_synthesizes_notify() {
        let broker = test_broker(600);
        let request_id = ids::gen_request_id();
        let req = InvokeReq {
            request_id: request_id.clone(),
            instance_id: "ins-7".to_owned(),
            function: "f".to_owned(),
            ..Default::default()
        };
        let ticket = broker.invoke(req, Some(Duration::from_secs(1)));

        let outcome = ticket.notify.await.expect("notify must settle");
        assert!(outcome.timed_out);
        assert_eq!(
            ErrorCode::try_from(outcome.notify.code).unwrap(),
            ErrorCode::ErrInnerSystemError
        );
        assert!(outcome.notify.message.contains("invoke request timeout"));
        assert!(outcome.notify.message.contains(&request_id));
        assert_eq!(broker.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_clears_pending_requests() {
        let broker = test_broker(600);
        let request_id = ids::gen_request_id();
        let ticket = broker.create(create_req(&request_id), None);
        assert_eq!(broker.outstanding(), 1);

        broker.clear();
        let rsp = ticket.response.await.expect("finalized response");
        assert_eq!(rsp.code(), ErrorCode::ErrFinalized);
        assert_eq!(broker.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatching_a_response_settles_and_keeps_the_record_for_notify() {
        let broker = test_broker(600);
        let request_id = ids::gen_request_id();
        let ticket = broker.create(create_req(&request_id), None);

        let rsp_msg = StreamMsg::wrap(
            ids::gen_message_id(&request_id, 0),
            CreateRsp {
                code: ErrorCode::ErrNone as i32,
                message: String::new(),
                instance_id: "ins-9".to_owned(),
                request_id: request_id.clone(),
            },
        );
        broker.inner().dispatch_inbound(FUNCTION_PROXY, rsp_msg, false);
        let rsp = ticket.response.await.expect("response");
        assert_eq!(rsp.code(), ErrorCode::ErrNone);
        assert_eq!(rsp.instance_id, "ins-9");
        // record survives to deliver the notify
        assert_eq!(broker.outstanding(), 1);

        let notify_msg = StreamMsg::wrap(
            ids::gen_message_id(&request_id, 0),
            NotifyReq {
                code: ErrorCode::ErrNone as i32,
                request_id: request_id.clone(),
                ..Default::default()
            },
        );
        broker.inner().dispatch_inbound(FUNCTION_PROXY, notify_msg, false);
        let outcome = ticket.notify.await.expect("notify");
        assert!(!outcome.timed_out);
        assert_eq!(outcome.notify.request_id, request_id);
        assert_eq!(broker.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn communication_coded_response_is_ignored_and_retried() {
        let broker = test_broker(600);
        let request_id = ids::gen_request_id();
        let _ticket = broker.create(create_req(&request_id), None);

        let rsp_msg = StreamMsg::wrap(
            ids::gen_message_id(&request_id, 0),
            CreateRsp {
                code: ErrorCode::ErrRequestBetweenRuntimeBus as i32,
                message: "bus hiccup".to_owned(),
                instance_id: String::new(),
                request_id: request_id.clone(),
            },
        );
        broker.inner().dispatch_inbound(FUNCTION_PROXY, rsp_msg, false);
        // the record is still outstanding: the retry loop owns it
        assert_eq!(broker.outstanding(), 1);
    }
}
