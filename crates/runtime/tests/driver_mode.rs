// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Driver bring-up: the discovery handshake teaches the proxy where the
//! driver listens, the proxy connects back, and the serving side enforces
//! the single-proxy-stream and instance-id rules.

mod common;

use common::{RecordingHandlers, fast_config, start_mock_bus};
use fnbus_proto::proto::fnbus::v1::StreamMsg;
use fnbus_proto::proto::fnbus::v1::fn_bus_client::FnBusClient;
use fnbus_runtime::{BusClient, BusClientOptions, ClientMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::transport::Endpoint;

async fn proxy_connect_back(
    driver_port: u16,
    instance_id: Option<&str>,
) -> Result<
    (
        mpsc::Sender<StreamMsg>,
        tonic::Streaming<StreamMsg>,
    ),
    tonic::Status,
> {
    let channel = Endpoint::new(format!("http://127.0.0.1:{driver_port}"))
        .expect("valid endpoint")
        .connect()
        .await
        .expect("driver port must be reachable");
    let mut client = FnBusClient::new(channel);
    let (tx, rx) = mpsc::channel::<StreamMsg>(16);
    let mut request = Request::new(ReceiverStream::new(rx));
    if let Some(instance_id) = instance_id {
        let _ = request
            .metadata_mut()
            .insert("instance_id", instance_id.parse().unwrap());
    }
    let streaming = client.msg_stream(request).await?.into_inner();
    Ok((tx, streaming))
}

#[tokio::test]
async fn driver_discovers_and_accepts_exactly_one_proxy_stream() {
    let mut proxy = start_mock_bus().await;
    let proxy_port = proxy.port;

    // once the discovery request lands, dial the advertised driver port
    // the way the proxy would
    let (attach_tx, mut attach_rx) = mpsc::unbounded_channel();
    let discovery_task = tokio::spawn(async move {
        let request = timeout(Duration::from_secs(10), proxy.discoveries.recv())
            .await
            .expect("timed out waiting for discovery")
            .expect("mock gone");
        let driver_port: u16 = request.driver_port.parse().expect("driver port");
        let stream = proxy_connect_back(driver_port, None)
            .await
            .expect("proxy connect-back must be accepted");
        let _ = attach_tx.send(stream);
        request
    });

    let driver = BusClient::start(
        fast_config(),
        BusClientOptions {
            mode: ClientMode::Driver,
            proxy_ip: "127.0.0.1".to_owned(),
            proxy_port,
            listen_ip: "127.0.0.1".to_owned(),
            listen_port: 0,
            job_id: "job-1".to_owned(),
            instance_id: String::new(),
            runtime_id: "rt-1".to_owned(),
            function_name: "echo".to_owned(),
            handlers: Arc::new(RecordingHandlers::default()),
            security: None,
            resubscribe: None,
        },
    )
    .await
    .expect("driver must start");

    let request = discovery_task.await.expect("discovery observed");
    assert_eq!(request.job_id, "job-1");
    assert_eq!(request.instance_id, "driver-job-1");
    assert_eq!(request.function_name, "echo");
    let driver_port: u16 = request.driver_port.parse().expect("driver port");

    assert_eq!(driver.node_id(), "node-17");
    assert_eq!(driver.node_ip(), "10.1.2.3");
    assert_eq!(driver.server_version(), "1.9.0");

    // keep the first proxy stream alive
    let _first = attach_rx.recv().await.expect("first stream");

    // a second proxy stream is refused
    let err = proxy_connect_back(driver_port, None)
        .await
        .expect_err("second proxy stream must be rejected");
    assert_eq!(err.code(), tonic::Code::AlreadyExists);

    // a stream claiming a foreign instance id is refused outright
    let err = proxy_connect_back(driver_port, Some("other-instance"))
        .await
        .expect_err("mismatched instance id must be rejected");
    assert_eq!(err.code(), tonic::Code::InvalidArgument);

    driver.stop();
}
