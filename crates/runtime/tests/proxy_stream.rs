// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios over the proxy stream: request/response
//! correlation, retries, timeouts and inbound call gating.

mod common;

use common::{RecordingHandlers, fast_config, start_mock_bus, start_worker};
use fnbus_proto::proto::fnbus::v1::{
    Arg, CallReq, CreateReq, CreateRsp, InvokeReq, InvokeRsp, NotifyReq, StreamMsg,
};
use fnbus_proto::{ErrorCode, MsgKind};
use fnbus_runtime::ids;
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

fn ok_notify(request_id: &str) -> NotifyReq {
    NotifyReq {
        code: ErrorCode::ErrNone as i32,
        request_id: request_id.to_owned(),
        ..Default::default()
    }
}

#[tokio::test]
async fn happy_path_invoke_settles_through_response_and_notify() {
    let mut proxy = start_mock_bus().await;
    let worker = start_worker(
        fast_config(),
        proxy.port,
        Arc::new(RecordingHandlers::default()),
        None,
    )
    .await;
    let to_worker = proxy.next_attach().await;

    let request_id = ids::gen_request_id();
    let ticket = worker.invoke(invoke_req(&request_id, "ins-1"), None);

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
        .send(StreamMsg::wrap(sent.message_id, ok_notify(&request_id)))
        .await;

    let outcome = ticket.notify.await.expect("notify must settle");
    assert!(!outcome.timed_out);
    assert_eq!(outcome.notify.request_id, request_id);
    assert_eq!(
        ErrorCode::try_from(outcome.notify.code).unwrap(),
        ErrorCode::ErrNone
    );
    assert_eq!(worker.broker().outstanding(), 0);
    worker.stop();
}

#[tokio::test]
async fn invoke_timeout_synthesizes_notify_and_signals_the_target() {
    let mut proxy = start_mock_bus().await;
    let worker = start_worker(
        fast_config(),
        proxy.port,
        Arc::new(RecordingHandlers::default()),
        None,
    )
    .await;
    let _to_worker = proxy.next_attach().await;

    let request_id = ids::gen_request_id();
    let ticket = worker.invoke(
        invoke_req(&request_id, "ins-2"),
        Some(Duration::from_secs(1)),
    );
    let _ = proxy.expect_msg(MsgKind::InvokeReq).await;

    let outcome = ticket.notify.await.expect("notify must settle");
    assert!(outcome.timed_out);
    assert_eq!(
        ErrorCode::try_from(outcome.notify.code).unwrap(),
        ErrorCode::ErrInnerSystemError
    );
    assert!(outcome.notify.message.contains("invoke request timeout"));
    assert!(outcome.notify.message.contains(&request_id));

    // the peer is told to unblock whatever thread was waiting
    let signal = proxy.expect_msg(MsgKind::SignalReq).await;
    match signal.body {
        Some(fnbus_proto::Body::SignalReq(req)) => {
            assert_eq!(req.signal(), fnbus_proto::Signal::ErasePendingThread);
            assert_eq!(req.request_id, request_id);
            assert_eq!(req.instance_id, "ins-2");
        }
        other => panic!("expected SignalReq body, got {other:?}"),
    }
    assert_eq!(worker.broker().outstanding(), 0);
    worker.stop();
}

#[tokio::test]
async fn communication_error_response_triggers_retry_with_incremented_byte() {
    let mut proxy = start_mock_bus().await;
    let worker = start_worker(
        fast_config(),
        proxy.port,
        Arc::new(RecordingHandlers::default()),
        None,
    )
    .await;
    let to_worker = proxy.next_attach().await;

    let request_id = ids::gen_request_id();
    let ticket = worker.create(
        CreateReq {
            request_id: request_id.clone(),
            function: "echo".to_owned(),
            ..Default::default()
        },
        None,
    );

    let first = proxy.expect_msg(MsgKind::CreateReq).await;
    assert_eq!(ids::retry_of(&first.message_id), Some(0));
    to_worker
        .send(StreamMsg::wrap(
            first.message_id,
            CreateRsp {
                code: ErrorCode::ErrRequestBetweenRuntimeBus as i32,
                message: "bus hiccup".to_owned(),
                instance_id: String::new(),
                request_id: request_id.clone(),
            },
        ))
        .await;

    // the communication-coded response is swallowed; the next attempt
    // carries an incremented retry byte but folds back to the request id
    let second = proxy.expect_msg(MsgKind::CreateReq).await;
    assert_eq!(ids::request_id_of(&second.message_id), request_id);
    assert_eq!(ids::retry_of(&second.message_id), Some(1));

    to_worker
        .send(StreamMsg::wrap(
            second.message_id.clone(),
            CreateRsp {
                code: ErrorCode::ErrNone as i32,
                message: String::new(),
                instance_id: "ins-9".to_owned(),
                request_id: request_id.clone(),
            },
        ))
        .await;
    let rsp = ticket.response.await.expect("response must settle");
    assert_eq!(rsp.code(), ErrorCode::ErrNone);
    assert_eq!(rsp.instance_id, "ins-9");

    to_worker
        .send(StreamMsg::wrap(second.message_id, ok_notify(&request_id)))
        .await;
    let outcome = ticket.notify.await.expect("notify must settle");
    assert_eq!(outcome.notify.request_id, request_id);
    assert_eq!(worker.broker().outstanding(), 0);
    worker.stop();
}

#[tokio::test]
async fn duplicate_inbound_call_runs_init_once_and_acks_both() {
    let mut proxy = start_mock_bus().await;
    let handlers = Arc::new(RecordingHandlers::default());
    let worker = start_worker(fast_config(), proxy.port, Arc::clone(&handlers) as _, None).await;
    let to_worker = proxy.next_attach().await;

    let request_id = ids::gen_request_id();
    let call = CallReq {
        request_id: request_id.clone(),
        function: "echo".to_owned(),
        is_create: true,
        ..Default::default()
    };
    for retry in 0..2u8 {
        to_worker
            .send(StreamMsg::wrap(
                ids::gen_message_id(&request_id, retry),
                call.clone(),
            ))
            .await;
    }

    let first = proxy.expect_msg(MsgKind::CallRsp).await;
    let second = proxy.expect_msg(MsgKind::CallRsp).await;
    for rsp in [first, second] {
        match rsp.body {
            Some(fnbus_proto::Body::CallRsp(rsp)) => {
                assert_eq!(rsp.code(), ErrorCode::ErrNone);
            }
            other => panic!("expected CallRsp body, got {other:?}"),
        }
    }
    assert_eq!(handlers.inits.load(Ordering::SeqCst), 1);
    worker.stop();
}

#[tokio::test]
async fn oversize_message_settles_synchronously_with_param_invalid() {
    let mut proxy = start_mock_bus().await;
    let mut cfg = fast_config();
    cfg.max_grpc_mb = 1;
    let worker = start_worker(cfg, proxy.port, Arc::new(RecordingHandlers::default()), None).await;
    let _to_worker = proxy.next_attach().await;

    let request_id = ids::gen_request_id();
    let mut req = invoke_req(&request_id, "ins-3");
    req.args.push(Arg {
        r#type: 0,
        value: vec![0u8; 2 * 1024 * 1024],
        object_id: String::new(),
    });
    let ticket = worker.invoke(req, None);

    let outcome = ticket.notify.await.expect("notify must settle");
    assert_eq!(
        ErrorCode::try_from(outcome.notify.code).unwrap(),
        ErrorCode::ErrParamInvalid
    );
    // the transport never saw the message
    proxy
        .expect_absent(MsgKind::InvokeReq, Duration::from_millis(300))
        .await;
    assert_eq!(worker.broker().outstanding(), 0);
    worker.stop();
}
