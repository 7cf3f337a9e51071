// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! The typed façade the rest of the runtime talks to.
//!
//! Wires user requests to the broker and user handlers to the service. Owns
//! start-up (serving port, driver discovery, proxy stream) and graceful
//! shutdown (stop service, fail pending requests, release connections).

use crate::broker::{Broker, CreateTicket, GroupCreateTicket, InvokeTicket};
use crate::codes::ErrorInfo;
use crate::dispatch::{Handlers, InboundDispatch};
use crate::pool::ConnectionPool;
use crate::registry::StreamRegistry;
use crate::security::Security;
use crate::service::{BusService, ServiceOptions};
use crate::stream::{ClientStreamOptions, DiscoverCb, PeerCallback, StreamRw};
use fnbus_config::{BusConfig, FUNCTION_PROXY};
use fnbus_proto::ErrorCode;
use fnbus_proto::proto::fnbus::v1::bus_gateway_client::BusGatewayClient;
use fnbus_proto::proto::fnbus::v1::{
    CallResultAck, CallResultReq, CreateReq, CreateReqs, DiscoverDriverRequest,
    DiscoverDriverResponse, ExitReq, ExitRsp, InvokeReq, KillReq, KillRsp, LoadReq, LoadRsp,
    RGroupReq, RGroupRsp, SaveReq, SaveRsp,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tonic::transport::Endpoint;
use tracing::{debug, info, warn};

const DISCOVER_RETRY_TIMES: usize = 3;
const DISCOVER_RETRY_WAIT: Duration = Duration::from_secs(2);
const ATTACH_WAIT: Duration = Duration::from_secs(30);

/// How this process participates in the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    /// Serves a listening port, performs the discovery handshake and waits
    /// for the proxy to connect back.
    Driver,
    /// Performs the discovery handshake but connects out to the proxy
    /// instead of serving a port for it.
    DriverClient,
    /// Connects out to the proxy; serves a port only for direct calls.
    CloudClient,
    /// Serves a listening port and waits for the proxy to connect.
    CloudServer,
}

/// Start-up options for [`BusClient::start`].
pub struct BusClientOptions {
    /// Participation mode.
    pub mode: ClientMode,
    /// Proxy address (driver and cloud-client modes).
    pub proxy_ip: String,
    /// Proxy port.
    pub proxy_port: u16,
    /// Listening ip for server modes.
    pub listen_ip: String,
    /// Listening port for server modes; 0 picks an unused one.
    pub listen_port: u16,
    /// Job this process belongs to.
    pub job_id: String,
    /// This worker's instance id; empty derives `driver-{job_id}`.
    pub instance_id: String,
    /// This worker's runtime id.
    pub runtime_id: String,
    /// Function name announced during discovery.
    pub function_name: String,
    /// Inbound request handlers.
    pub handlers: Arc<dyn Handlers>,
    /// TLS material.
    pub security: Option<Security>,
    /// Re-subscription hook fired after every proxy (re)connect.
    pub resubscribe: Option<Arc<dyn Fn() + Send + Sync>>,
}

#[derive(Default, Clone)]
struct PeerIdentity {
    node_id: String,
    node_ip: String,
    server_version: String,
}

/// The client runtime: broker plus serving side behind one typed surface.
pub struct BusClient {
    broker: Broker,
    registry: Arc<StreamRegistry>,
    dispatch: Arc<InboundDispatch>,
    pool: Arc<ConnectionPool>,
    service: Option<BusService>,
    identity: Mutex<PeerIdentity>,
    stopped: AtomicBool,
}

impl BusClient {
    /// Brings the runtime up in the requested mode.
    pub async fn start(cfg: BusConfig, mut opts: BusClientOptions) -> Result<Self, ErrorInfo> {
        let instance_id = if !opts.instance_id.is_empty() {
            opts.instance_id.clone()
        } else if !cfg.instance_id.is_empty() {
            cfg.instance_id.clone()
        } else {
            format!("driver-{}", opts.job_id)
        };
        let client_mode = matches!(opts.mode, ClientMode::CloudClient | ClientMode::DriverClient);
        let is_driver = matches!(opts.mode, ClientMode::Driver | ClientMode::DriverClient);
        let direct_call = cfg.direct_connection_enable;

        // a config-level SNI override applies when the material itself
        // carries none
        if let (Some(security), Some(name)) =
            (opts.security.as_mut(), cfg.server_name_override.as_ref())
        {
            if security.server_name_override.is_none() {
                security.server_name_override = Some(name.clone());
            }
        }

        let registry = Arc::new(StreamRegistry::default());
        let dispatch = Arc::new(InboundDispatch::new(Arc::clone(&opts.handlers)));
        let pool = Arc::new(ConnectionPool::new(&cfg));
        let broker = Broker::new(
            &cfg,
            instance_id.clone(),
            opts.runtime_id.clone(),
            Arc::clone(&registry),
            Arc::clone(&dispatch),
            Arc::clone(&pool),
            opts.security.clone(),
        );
        if let Some(resubscribe) = &opts.resubscribe {
            broker.set_resubscribe(Arc::clone(resubscribe));
        }

        // server modes always listen; client mode only for direct calls
        let mut service = None;
        if !client_mode || direct_call {
            let (listen_ip, listen_port) = if client_mode {
                if cfg.pod_ip.is_empty() {
                    return Err(ErrorInfo::param_invalid(
                        "POD_IP env should be properly set, while client mode & direct call enabled",
                    ));
                }
                (cfg.pod_ip.clone(), cfg.direct_runtime_port)
            } else {
                (opts.listen_ip.clone(), opts.listen_port)
            };
            info!(
                "start with server mode {} or direct call {direct_call}, ready to start service",
                !client_mode
            );
            let svc = BusService::start(
                ServiceOptions {
                    instance_id: instance_id.clone(),
                    runtime_id: opts.runtime_id.clone(),
                    listen_ip: listen_ip.clone(),
                    listen_port,
                    max_msg_bytes: cfg.max_msg_bytes(),
                    proxy_disconnect_timeout: cfg.proxy_disconnect_timeout(),
                    peer_disconnect_timeout: cfg.peer_disconnect_timeout(),
                    security: opts.security.clone(),
                    proxy_dispatcher: broker.inner().proxy_dispatcher(),
                    direct_dispatcher: broker.inner().direct_dispatcher(),
                    resend_cb: resend_hook(&broker),
                    disconnected_cb: disconnect_hook(&broker),
                },
                Arc::clone(&registry),
            )
            .await?;
            broker.set_route(listen_ip, svc.listen_port());
            service = Some(svc);
        }

        let client = BusClient {
            broker,
            registry,
            dispatch,
            pool,
            service,
            identity: Mutex::new(PeerIdentity::default()),
            stopped: AtomicBool::new(false),
        };

        if is_driver {
            // a client-mode driver advertises no serving port
            let listen_port = if client_mode {
                0
            } else {
                client
                    .service
                    .as_ref()
                    .map(BusService::listen_port)
                    .unwrap_or_default()
            };
            let rsp = discover_driver(
                &opts.proxy_ip,
                opts.proxy_port,
                opts.security.as_ref(),
                DiscoverDriverRequest {
                    driver_ip: opts.listen_ip.clone(),
                    driver_port: listen_port.to_string(),
                    job_id: opts.job_id.clone(),
                    instance_id: instance_id.clone(),
                    function_name: opts.function_name.clone(),
                },
            )
            .await?;
            info!(
                "server version is {}, node id is {}, node ip is {}",
                rsp.server_version, rsp.node_id, rsp.host_ip
            );
            *client.identity.lock() = PeerIdentity {
                node_id: rsp.node_id,
                node_ip: rsp.host_ip,
                server_version: rsp.server_version,
            };
        }

        if client_mode {
            let discover_cb = driver_discover_hook(&opts, &instance_id);
            let proxy_stream = StreamRw::connect_client(
                instance_id.clone(),
                FUNCTION_PROXY.to_owned(),
                opts.runtime_id.clone(),
                Arc::clone(&client.pool),
                ClientStreamOptions {
                    ip: opts.proxy_ip.clone(),
                    port: opts.proxy_port,
                    disconnected_timeout: cfg.proxy_disconnect_timeout(),
                    backoff_min: cfg.reconnect_backoff_min(),
                    backoff_max: cfg.reconnect_backoff_max(),
                    security: opts.security.clone(),
                    resend_cb: Some(resend_hook(&client.broker)),
                    disconnected_cb: Some(disconnect_hook(&client.broker)),
                    discover_cb,
                },
                client.broker.inner().proxy_dispatcher(),
            )
            .await?;
            client.registry.update_proxy(proxy_stream);
            if let Some(resubscribe) = &opts.resubscribe {
                resubscribe();
            }
        } else if let Some(service) = &client.service {
            if !service.wait_attached(ATTACH_WAIT).await {
                client.stop();
                return Err(ErrorInfo::new(
                    ErrorCode::ErrInitConnectionFailed,
                    "wait for connection timeout",
                ));
            }
        }

        if is_driver {
            // a driver has no create call; it is born initialized
            let _ = client.dispatch.status().set_initializing();
            client.dispatch.status().set_initialized();
        }
        Ok(client)
    }

    /// The broker surface.
    #[must_use]
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Sends a group create.
    pub fn group_create(&self, reqs: CreateReqs) -> GroupCreateTicket {
        self.broker.group_create(reqs)
    }

    /// Sends a create.
    pub fn create(&self, req: CreateReq, timeout: Option<Duration>) -> CreateTicket {
        self.broker.create(req, timeout)
    }

    /// Sends an invoke.
    pub fn invoke(&self, req: InvokeReq, timeout: Option<Duration>) -> InvokeTicket {
        self.broker.invoke(req, timeout)
    }

    /// Sends a call result upstream.
    pub fn call_result(
        &self,
        req: CallResultReq,
        exist_obj_in_ds: bool,
    ) -> oneshot::Receiver<CallResultAck> {
        self.broker.call_result(req, exist_obj_in_ds)
    }

    /// Returns a handled call's result: drives the instance lifecycle for
    /// create results and clears the in-flight entry once acked.
    pub fn return_call_result(
        &self,
        result: CallResultReq,
        is_create: bool,
        exist_obj_in_ds: bool,
    ) -> oneshot::Receiver<CallResultAck> {
        if is_create {
            if result.code == ErrorCode::ErrNone as i32 {
                self.dispatch.status().set_initialized();
            } else {
                self.dispatch
                    .status()
                    .set_initializing_failure(result.code(), result.message.clone());
            }
        }
        let request_id = result.request_id.clone();
        let ack_rx = self.broker.call_result(result, exist_obj_in_ds);
        let processing = Arc::clone(self.dispatch.processing());
        let (tx, rx) = oneshot::channel();
        let _ = tokio::spawn(async move {
            let ack = ack_rx.await;
            if !processing.remove(&request_id) {
                warn!("call request has already finished, request ID: {request_id}");
            }
            if let Ok(ack) = ack {
                let _ = tx.send(ack);
            }
        });
        rx
    }

    /// Kills an instance.
    pub fn kill(&self, req: KillReq, timeout: Option<Duration>) -> oneshot::Receiver<KillRsp> {
        self.broker.kill(req, timeout)
    }

    /// Announces process exit.
    pub fn exit(&self, req: ExitReq) -> oneshot::Receiver<ExitRsp> {
        self.broker.exit(req)
    }

    /// Saves instance state.
    pub fn state_save(&self, req: SaveReq) -> oneshot::Receiver<SaveRsp> {
        self.broker.state_save(req)
    }

    /// Loads instance state.
    pub fn state_load(&self, req: LoadReq) -> oneshot::Receiver<LoadRsp> {
        self.broker.state_load(req)
    }

    /// Creates a resource group.
    pub fn create_rgroup(
        &self,
        req: RGroupReq,
        timeout: Option<Duration>,
    ) -> oneshot::Receiver<RGroupRsp> {
        self.broker.create_rgroup(req, timeout)
    }

    /// Waits for in-flight inbound requests to drain; returns the unused
    /// remainder of the grace period.
    pub async fn wait_request_empty(&self, grace: Duration) -> Duration {
        self.dispatch.processing().wait_empty(grace).await
    }

    /// Drops the direct stream to an instance.
    pub fn remove_peer_stream(&self, instance_id: &str) {
        self.broker.remove_peer_stream(instance_id);
    }

    /// Node id learned during discovery.
    #[must_use]
    pub fn node_id(&self) -> String {
        self.identity.lock().node_id.clone()
    }

    /// Node ip learned during discovery.
    #[must_use]
    pub fn node_ip(&self) -> String {
        self.identity.lock().node_ip.clone()
    }

    /// Server version learned during discovery.
    #[must_use]
    pub fn server_version(&self) -> String {
        self.identity.lock().server_version.clone()
    }

    /// Graceful shutdown: stops serving, fails every pending request with
    /// `ERR_FINALIZED` and tears the streams down.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("stopping bus client");
        self.broker.clear();
        self.registry.clear();
        if let Some(service) = &self.service {
            service.stop();
        }
    }
}

impl Drop for BusClient {
    fn drop(&mut self) {
        self.stop();
    }
}

fn resend_hook(broker: &Broker) -> PeerCallback {
    let weak = Arc::downgrade(broker.inner());
    Arc::new(move |peer: &str| {
        if let Some(inner) = weak.upgrade() {
            inner.resend_requests(peer);
        }
    })
}

fn disconnect_hook(broker: &Broker) -> PeerCallback {
    let weak = Arc::downgrade(broker.inner());
    Arc::new(move |peer: &str| {
        if let Some(inner) = weak.upgrade() {
            inner.notify_disconnected(peer);
        }
    })
}

/// On auth loss a driver re-runs the discovery handshake before the stream
/// reconnects.
fn driver_discover_hook(opts: &BusClientOptions, instance_id: &str) -> Option<DiscoverCb> {
    if opts.mode != ClientMode::DriverClient {
        return None;
    }
    let proxy_ip = opts.proxy_ip.clone();
    let proxy_port = opts.proxy_port;
    let security = opts.security.clone();
    let request = DiscoverDriverRequest {
        driver_ip: opts.listen_ip.clone(),
        driver_port: "0".to_owned(),
        job_id: opts.job_id.clone(),
        instance_id: instance_id.to_owned(),
        function_name: opts.function_name.clone(),
    };
    Some(Arc::new(move || {
        let proxy_ip = proxy_ip.clone();
        let security = security.clone();
        let request = request.clone();
        Box::pin(async move {
            let _ = discover_driver(&proxy_ip, proxy_port, security.as_ref(), request).await?;
            Ok(())
        })
    }))
}

/// The unary discovery handshake, retried a bounded number of times on
/// transport failure.
async fn discover_driver(
    proxy_ip: &str,
    proxy_port: u16,
    security: Option<&Security>,
    request: DiscoverDriverRequest,
) -> Result<DiscoverDriverResponse, ErrorInfo> {
    debug!(
        "start to notify driver discovery, job {}, instance {}, listening port {}",
        request.job_id, request.instance_id, request.driver_port
    );
    let mut last_err = String::new();
    for attempt in 0..DISCOVER_RETRY_TIMES {
        match try_discover(proxy_ip, proxy_port, security, request.clone()).await {
            Ok(rsp) => return Ok(rsp),
            Err(err) => {
                debug!("discover driver failed: {err}, retry index: {attempt}");
                last_err = err;
                tokio::time::sleep(DISCOVER_RETRY_WAIT).await;
            }
        }
    }
    warn!("discover driver gave up after {DISCOVER_RETRY_TIMES} tries: {last_err}");
    Err(ErrorInfo::new(
        ErrorCode::ErrInitConnectionFailed,
        format!("failed to connect to cluster {proxy_ip}:{proxy_port}"),
    ))
}

async fn try_discover(
    proxy_ip: &str,
    proxy_port: u16,
    security: Option<&Security>,
    request: DiscoverDriverRequest,
) -> Result<DiscoverDriverResponse, String> {
    let tls = security.and_then(Security::client_tls);
    let scheme = if tls.is_some() { "https" } else { "http" };
    let mut endpoint = Endpoint::new(format!("{scheme}://{proxy_ip}:{proxy_port}"))
        .map_err(|e| e.to_string())?;
    if let Some(tls) = tls {
        endpoint = endpoint.tls_config(tls).map_err(|e| e.to_string())?;
    }
    let channel = endpoint.connect().await.map_err(|e| e.to_string())?;
    let mut client = BusGatewayClient::new(channel);
    client
        .discover_driver(request)
        .await
        .map(tonic::Response::into_inner)
        .map_err(|status| format!("{} {}", status.code(), status.message()))
}
