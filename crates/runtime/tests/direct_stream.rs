// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Direct peer-to-peer scenarios: stream bring-up from a notify's route
//! info, batched framing, downgrade to the proxy, and selective resend on
//! proxy reconnect.

mod common;

use common::{MockBusHandle, RecordingHandlers, WorkerTx, fast_config, start_mock_bus, start_worker};
use fnbus_proto::proto::fnbus::v1::{
    CallResultReq, CallRsp, CreateReq, InvokeReq, InvokeRsp, NotifyReq, RouteInfo, StreamMsg,
};
use fnbus_proto::{ErrorCode, MsgKind};
use fnbus_runtime::{BusClient, ids};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

fn invoke_req(request_id: &str, instance_id: &str) -> InvokeReq {
    InvokeReq {
        request_id: request_id.to_owned(),
        instance_id: instance_id.to_owned(),
        function: "echo".to_owned(),
        ..Default::default()
    }
}

fn routed_notify(request_id: &str, peer_port: u16) -> NotifyReq {
    NotifyReq {
        code: ErrorCode::ErrNone as i32,
        request_id: request_id.to_owned(),
        route_info: Some(RouteInfo {
            server_ip: "127.0.0.1".to_owned(),
            server_port: i32::from(peer_port),
        }),
        ..Default::default()
    }
}

/// Runs one proxied invoke whose notify advertises the peer's serving
/// address, which makes the worker open a direct batch stream.
async fn establish_direct_stream(
    worker: &BusClient,
    proxy: &mut MockBusHandle,
    to_worker: &WorkerTx,
    peer: &mut MockBusHandle,
    instance_id: &str,
) -> WorkerTx {
    let request_id = ids::gen_request_id();
    let ticket = worker.invoke(invoke_req(&request_id, instance_id), None);
    let sent = proxy.expect_msg(MsgKind::InvokeReq).await;
    to_worker
        .send(StreamMsg::wrap(
            sent.message_id.clone(),
            InvokeRsp {
                code: ErrorCode::ErrNone as i32,
                message: String::new(),
                request_id: request_id.clone(),
            },
        ))
        .await;
    to_worker
        .send(StreamMsg::wrap(
            sent.message_id,
            routed_notify(&request_id, peer.port),
        ))
        .await;
    let _ = ticket.notify.await.expect("notify must settle");

    let to_worker_direct = peer.next_attach().await;
    // give the worker a beat to register the fresh stream
    tokio::time::sleep(Duration::from_millis(200)).await;
    to_worker_direct
}

#[tokio::test]
async fn notify_route_info_opens_direct_stream_and_invokes_bypass_the_proxy() {
    let mut proxy = start_mock_bus().await;
    let mut peer = start_mock_bus().await;
    let mut cfg = fast_config();
    cfg.direct_connection_enable = true;
    cfg.pod_ip = "127.0.0.1".to_owned();
    let worker = start_worker(cfg, proxy.port, Arc::new(RecordingHandlers::default()), None).await;
    let to_worker = proxy.next_attach().await;

    let to_worker_direct =
        establish_direct_stream(&worker, &mut proxy, &to_worker, &mut peer, "ins-d").await;

    // the next invoke rides the direct stream, batched
    let request_id = ids::gen_request_id();
    let ticket = worker.invoke(invoke_req(&request_id, "ins-d"), None);
    let sent = peer.expect_msg(MsgKind::InvokeReq).await;
    assert_eq!(ids::request_id_of(&sent.message_id), request_id);
    proxy
        .expect_absent(MsgKind::InvokeReq, Duration::from_millis(300))
        .await;

    // the peer answers on the same stream; the worker translates the
    // call-shaped frames back into invoke shapes
    to_worker_direct
        .send(StreamMsg::wrap(
            sent.message_id.clone(),
            CallRsp {
                code: ErrorCode::ErrNone as i32,
                message: String::new(),
                request_id: request_id.clone(),
            },
        ))
        .await;
    to_worker_direct
        .send(StreamMsg::wrap(
            sent.message_id,
            CallResultReq {
                code: ErrorCode::ErrNone as i32,
                request_id: request_id.clone(),
                ..Default::default()
            },
        ))
        .await;

    let outcome = ticket.notify.await.expect("notify must settle");
    assert_eq!(outcome.notify.request_id, request_id);
    assert_eq!(
        ErrorCode::try_from(outcome.notify.code).unwrap(),
        ErrorCode::ErrNone
    );
    assert_eq!(worker.broker().outstanding(), 0);
    worker.stop();
}

#[tokio::test]
async fn direct_stream_loss_downgrades_to_the_proxy_without_user_visible_error() {
    let mut proxy = start_mock_bus().await;
    let mut peer = start_mock_bus().await;
    let mut cfg = fast_config();
    cfg.direct_connection_enable = true;
    cfg.pod_ip = "127.0.0.1".to_owned();
    let worker = start_worker(cfg, proxy.port, Arc::new(RecordingHandlers::default()), None).await;
    let to_worker = proxy.next_attach().await;

    let to_worker_direct =
        establish_direct_stream(&worker, &mut proxy, &to_worker, &mut peer, "ins-d").await;

    // kill the peer outright so the direct stream cannot come back
    drop(to_worker_direct);
    peer.shutdown();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let request_id = ids::gen_request_id();
    let ticket = worker.invoke(invoke_req(&request_id, "ins-d"), None);
    let sent = proxy.expect_msg(MsgKind::InvokeReq).await;
    assert_eq!(ids::request_id_of(&sent.message_id), request_id);

    to_worker
        .send(StreamMsg::wrap(
            sent.message_id.clone(),
            InvokeRsp {
                code: ErrorCode::ErrNone as i32,
                message: String::new(),
                request_id: request_id.clone(),
            },
        ))
        .await;
    to_worker
        .send(StreamMsg::wrap(
            sent.message_id,
            NotifyReq {
                code: ErrorCode::ErrNone as i32,
                request_id: request_id.clone(),
                ..Default::default()
            },
        ))
        .await;
    let outcome = ticket.notify.await.expect("notify must settle");
    assert_eq!(
        ErrorCode::try_from(outcome.notify.code).unwrap(),
        ErrorCode::ErrNone
    );
    worker.stop();
}

#[tokio::test]
async fn proxy_reconnect_resends_only_proxy_targeted_requests() {
    let mut proxy = start_mock_bus().await;
    let mut peer = start_mock_bus().await;
    let mut cfg = fast_config();
    cfg.direct_connection_enable = true;
    cfg.pod_ip = "127.0.0.1".to_owned();
    // keep the per-request retry quiet during the observation window
    cfg.request_ack_timeout_sec = 20;

    let (resubscribes, hook) = common::counting_hook();
    let worker = start_worker(
        cfg,
        proxy.port,
        Arc::new(RecordingHandlers::default()),
        Some(hook),
    )
    .await;
    let to_worker = proxy.next_attach().await;
    let baseline = resubscribes.load(Ordering::SeqCst);

    let _to_worker_direct =
        establish_direct_stream(&worker, &mut proxy, &to_worker, &mut peer, "ins-d").await;

    // one outstanding request at the live direct peer, one at the proxy
    let direct_id = ids::gen_request_id();
    let _direct_ticket = worker.invoke(invoke_req(&direct_id, "ins-d"), None);
    let _ = peer.expect_msg(MsgKind::InvokeReq).await;

    let proxy_id = ids::gen_request_id();
    let _proxy_ticket = worker.create(
        CreateReq {
            request_id: proxy_id.clone(),
            function: "echo".to_owned(),
            ..Default::default()
        },
        None,
    );
    let _ = proxy.expect_msg(MsgKind::CreateReq).await;

    // drop the proxy stream; the worker reconnects and resends selectively
    drop(to_worker);
    let _to_worker2 = proxy.next_attach().await;

    let resent = proxy.expect_msg(MsgKind::CreateReq).await;
    assert_eq!(ids::request_id_of(&resent.message_id), proxy_id);
    proxy
        .expect_absent(MsgKind::InvokeReq, Duration::from_secs(2))
        .await;
    assert_eq!(resubscribes.load(Ordering::SeqCst), baseline + 1);
    worker.stop();
}

#[tokio::test]
async fn batched_frames_respect_the_size_budget_and_preserve_order() {
    let mut proxy = start_mock_bus().await;
    let mut peer = start_mock_bus().await;
    let mut cfg = fast_config();
    cfg.direct_connection_enable = true;
    cfg.pod_ip = "127.0.0.1".to_owned();
    cfg.max_grpc_mb = 1;
    // keep retries out of the frame observation window
    cfg.request_ack_timeout_sec = 20;
    let budget = cfg.max_msg_bytes();
    let worker = start_worker(cfg, proxy.port, Arc::new(RecordingHandlers::default()), None).await;
    let to_worker = proxy.next_attach().await;

    let _to_worker_direct =
        establish_direct_stream(&worker, &mut proxy, &to_worker, &mut peer, "ins-d").await;

    // several chunky invokes in a row: they must roll over frame borders
    // without reordering
    let mut expected = Vec::new();
    for _ in 0..5 {
        let request_id = ids::gen_request_id();
        let mut req = invoke_req(&request_id, "ins-d");
        req.args.push(fnbus_proto::proto::fnbus::v1::Arg {
            r#type: 0,
            value: vec![7u8; 400 * 1024],
            object_id: String::new(),
        });
        let _ = worker.invoke(req, None);
        expected.push(request_id);
    }

    let mut seen = Vec::new();
    while seen.len() < expected.len() {
        let batch = tokio::time::timeout(Duration::from_secs(10), peer.frames.recv())
            .await
            .expect("timed out waiting for a batch frame")
            .expect("peer server gone");
        let mut frame_size = 0usize;
        for msg in &batch.msgs {
            frame_size += prost::Message::encoded_len(msg);
            if msg.kind() == Some(MsgKind::InvokeReq) {
                seen.push(ids::request_id_of(&msg.message_id).to_owned());
            }
        }
        assert!(
            frame_size <= budget,
            "batch frame of {frame_size} bytes exceeds the {budget} byte budget"
        );
    }
    assert_eq!(seen, expected);
    worker.stop();
}
