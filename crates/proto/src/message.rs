// Copyright The Function Bus Authors
// SPDX-License-Identifier: Apache-2.0

//! Convenience layer over the generated envelope: body kinds for table-based
//! dispatch and `From` conversions so call sites can wrap a body without
//! naming the oneof variant.

use crate::proto::fnbus::v1::{
    CallReq, CallResultAck, CallResultReq, CallRsp, CheckpointReq, CheckpointRsp, CreateReq,
    CreateReqs, CreateRsp, CreateRsps, ExitReq, ExitRsp, HeartbeatReq, HeartbeatRsp, InvokeReq,
    InvokeRsp, KillReq, KillRsp, LoadReq, LoadRsp, NotifyReq, NotifyRsp, RGroupReq, RGroupRsp,
    RecoverReq, RecoverRsp, SaveReq, SaveRsp, ShutdownReq, ShutdownRsp, SignalReq, SignalRsp,
    StreamMsg, stream_msg::Body,
};

/// Discriminant of an envelope body, used as a dispatch-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgKind {
    /// `CallReq`
    CallReq,
    /// `CallRsp`
    CallRsp,
    /// `NotifyReq`
    NotifyReq,
    /// `NotifyRsp`
    NotifyRsp,
    /// `CheckpointReq`
    CheckpointReq,
    /// `CheckpointRsp`
    CheckpointRsp,
    /// `RecoverReq`
    RecoverReq,
    /// `RecoverRsp`
    RecoverRsp,
    /// `ShutdownReq`
    ShutdownReq,
    /// `ShutdownRsp`
    ShutdownRsp,
    /// `SignalReq`
    SignalReq,
    /// `SignalRsp`
    SignalRsp,
    /// `HeartbeatReq`
    HeartbeatReq,
    /// `HeartbeatRsp`
    HeartbeatRsp,
    /// `CreateReq`
    CreateReq,
    /// `CreateRsp`
    CreateRsp,
    /// `CreateReqs`
    CreateReqs,
    /// `CreateRsps`
    CreateRsps,
    /// `InvokeReq`
    InvokeReq,
    /// `InvokeRsp`
    InvokeRsp,
    /// `CallResultReq`
    CallResultReq,
    /// `CallResultAck`
    CallResultAck,
    /// `KillReq`
    KillReq,
    /// `KillRsp`
    KillRsp,
    /// `ExitReq`
    ExitReq,
    /// `ExitRsp`
    ExitRsp,
    /// `SaveReq`
    SaveReq,
    /// `SaveRsp`
    SaveRsp,
    /// `LoadReq`
    LoadReq,
    /// `LoadRsp`
    LoadRsp,
    /// `RGroupReq`
    RGroupReq,
    /// `RGroupRsp`
    RGroupRsp,
}

impl Body {
    /// The dispatch-table key of this body.
    #[must_use]
    pub fn kind(&self) -> MsgKind {
        match self {
            Body::CallReq(_) => MsgKind::CallReq,
            Body::CallRsp(_) => MsgKind::CallRsp,
            Body::NotifyReq(_) => MsgKind::NotifyReq,
            Body::NotifyRsp(_) => MsgKind::NotifyRsp,
            Body::CheckpointReq(_) => MsgKind::CheckpointReq,
            Body::CheckpointRsp(_) => MsgKind::CheckpointRsp,
            Body::RecoverReq(_) => MsgKind::RecoverReq,
            Body::RecoverRsp(_) => MsgKind::RecoverRsp,
            Body::ShutdownReq(_) => MsgKind::ShutdownReq,
            Body::ShutdownRsp(_) => MsgKind::ShutdownRsp,
            Body::SignalReq(_) => MsgKind::SignalReq,
            Body::SignalRsp(_) => MsgKind::SignalRsp,
            Body::HeartbeatReq(_) => MsgKind::HeartbeatReq,
            Body::HeartbeatRsp(_) => MsgKind::HeartbeatRsp,
            Body::CreateReq(_) => MsgKind::CreateReq,
            Body::CreateRsp(_) => MsgKind::CreateRsp,
            Body::CreateReqs(_) => MsgKind::CreateReqs,
            Body::CreateRsps(_) => MsgKind::CreateRsps,
            Body::InvokeReq(_) => MsgKind::InvokeReq,
            Body::InvokeRsp(_) => MsgKind::InvokeRsp,
            Body::CallResultReq(_) => MsgKind::CallResultReq,
            Body::CallResultAck(_) => MsgKind::CallResultAck,
            Body::KillReq(_) => MsgKind::KillReq,
            Body::KillRsp(_) => MsgKind::KillRsp,
            Body::ExitReq(_) => MsgKind::ExitReq,
            Body::ExitRsp(_) => MsgKind::ExitRsp,
            Body::SaveReq(_) => MsgKind::SaveReq,
            Body::SaveRsp(_) => MsgKind::SaveRsp,
            Body::LoadReq(_) => MsgKind::LoadReq,
            Body::LoadRsp(_) => MsgKind::LoadRsp,
            Body::RGroupReq(_) => MsgKind::RGroupReq,
            Body::RGroupRsp(_) => MsgKind::RGroupRsp,
        }
    }
}

impl StreamMsg {
    /// Wraps a body into an envelope with the given message id.
    pub fn wrap(message_id: impl Into<String>, body: impl Into<Body>) -> Self {
        StreamMsg {
            message_id: message_id.into(),
            body: Some(body.into()),
        }
    }

    /// The dispatch-table key of the envelope body, if any.
    #[must_use]
    pub fn kind(&self) -> Option<MsgKind> {
        self.body.as_ref().map(Body::kind)
    }
}

macro_rules! impl_into_body {
    ($($ty:ident => $variant:ident,)*) => {
        $(
            impl From<$ty> for Body {
                fn from(value: $ty) -> Self {
                    Body::$variant(value)
                }
            }
        )*
    };
}

impl_into_body! {
    CallReq => CallReq,
    CallRsp => CallRsp,
    NotifyReq => NotifyReq,
    NotifyRsp => NotifyRsp,
    CheckpointReq => CheckpointReq,
    CheckpointRsp => CheckpointRsp,
    RecoverReq => RecoverReq,
    RecoverRsp => RecoverRsp,
    ShutdownReq => ShutdownReq,
    ShutdownRsp => ShutdownRsp,
    SignalReq => SignalReq,
    SignalRsp => SignalRsp,
    HeartbeatReq => HeartbeatReq,
    HeartbeatRsp => HeartbeatRsp,
    CreateReq => CreateReq,
    CreateRsp => CreateRsp,
    CreateReqs => CreateReqs,
    CreateRsps => CreateRsps,
    InvokeReq => InvokeReq,
    InvokeRsp => InvokeRsp,
    CallResultReq => CallResultReq,
    CallResultAck => CallResultAck,
    KillReq => KillReq,
    KillRsp => KillRsp,
    ExitReq => ExitReq,
    ExitRsp => ExitRsp,
    SaveReq => SaveReq,
    SaveRsp => SaveRsp,
    LoadReq => LoadReq,
    LoadRsp => LoadRsp,
    RGroupReq => RGroupReq,
    RGroupRsp => RGroupRsp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::fnbus::v1::ErrorCode as ErrorCodeWire;
    use prost::Message;

    #[test]
    fn wrap_sets_message_id_and_body() {
        let msg = StreamMsg::wrap(
            "req-000001",
            InvokeRsp {
                code: 0,
                message: String::new(),
                request_id: "req-0000".into(),
            },
        );
        assert_eq!(msg.message_id, "req-000001");
        assert_eq!(msg.kind(), Some(MsgKind::InvokeRsp));
    }

    #[test]
    fn envelope_roundtrips_through_prost() {
        let msg = StreamMsg::wrap(
            "abc01",
            NotifyReq {
                code: ErrorCodeWire::ErrNone as i32,
                message: "ok".into(),
                request_id: "abc00".into(),
                ..Default::default()
            },
        );
        let bytes = msg.encode_to_vec();
        let decoded = StreamMsg::decode(bytes.as_slice()).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn error_code_names_are_stable() {
        assert_eq!(
            ErrorCodeWire::ErrRequestBetweenRuntimeBus.as_str_name(),
            "ERR_REQUEST_BETWEEN_RUNTIME_BUS"
        );
        assert_eq!(
            ErrorCodeWire::from_str_name("ERR_FINALIZED"),
            Some(ErrorCodeWire::ErrFinalized)
        );
    }
}
