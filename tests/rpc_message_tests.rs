use skein::frame::{Frame, FrameCodec, FrameKind};
use skein::rpc::{
    CallMetadata, CodecError, RpcError, RpcMessage, RpcRequest, RpcResponse, RpcResultStatus,
    ServiceKey,
};

fn sample_request() -> RpcRequest {
    let mut metadata = CallMetadata::default();
    metadata.hash_key = Some("user-7".into());
    metadata
        .attachments
        .insert("auth".into(), "token-123".into());

    RpcRequest::new(&ServiceKey::new("UserService", "1.0.0"), "getUserById")
        .with_params(vec!["u64".into()], vec![vec![7, 0, 0, 0, 0, 0, 0, 0]])
        .with_metadata(metadata)
        .with_correlation_id(11)
}

#[test]
fn test_request_survives_the_wire() {
    let request = sample_request();
    let bytes = RpcMessage::Request(request.clone()).encode().unwrap();

    match RpcMessage::decode(&bytes).unwrap() {
        RpcMessage::Request(decoded) => {
            assert_eq!(decoded, request);
            assert_eq!(decoded.service_key(), ServiceKey::new("UserService", "1.0.0"));
            assert_eq!(decoded.signature(), "getUserById(u64)");
        }
        other => panic!("Expected a request, got {:?}", other),
    }
}

#[test]
fn test_one_way_flag_selects_one_way_frame() {
    let mut request = sample_request();
    request.metadata.one_way = true;

    let message = RpcMessage::from_request(request);
    assert!(matches!(message, RpcMessage::OneWay(_)));

    let bytes = message.encode().unwrap();
    assert!(matches!(
        RpcMessage::decode(&bytes).unwrap(),
        RpcMessage::OneWay(_)
    ));
}

#[test]
fn test_response_keeps_correlation_id() {
    let response = RpcResponse::success(11, b"payload".to_vec());
    let bytes = RpcMessage::Response(response.clone()).encode().unwrap();

    match RpcMessage::decode(&bytes).unwrap() {
        RpcMessage::Response(decoded) => {
            assert_eq!(decoded.correlation_id, 11);
            assert_eq!(decoded.into_result().unwrap(), b"payload");
        }
        other => panic!("Expected a response, got {:?}", other),
    }
}

#[test]
fn test_header_and_envelope_ids_must_agree() {
    let request = sample_request();
    let frame = Frame::new(FrameKind::Request, 999, bitcode::encode(&request));
    let bytes = FrameCodec::encode(&frame).unwrap();

    assert!(matches!(
        RpcMessage::decode(&bytes),
        Err(RpcError::Frame(_))
    ));
}

#[test]
fn test_keepalive_probes() {
    let ping = RpcMessage::Ping(3).encode().unwrap();
    let pong = RpcMessage::Pong(3).encode().unwrap();

    assert_eq!(RpcMessage::decode(&ping).unwrap(), RpcMessage::Ping(3));
    assert_eq!(RpcMessage::decode(&pong).unwrap(), RpcMessage::Pong(3));
}

#[test]
fn test_error_classification_round_trips_through_response() {
    let errors = vec![
        RpcError::InvocationTarget("boom".into()),
        RpcError::MethodNotFound("getUser(u64)".into()),
        RpcError::ServiceNotFound("UserService:1.0.0".into()),
        RpcError::ArgumentMismatch("expected 1 argument, got 2".into()),
        RpcError::Serialization("deserialize error: eof".into()),
        RpcError::FilterRejected("auth: missing token".into()),
        RpcError::Timeout,
    ];

    for error in errors {
        let response = RpcResponse::failure(5, &error);
        assert!(!response.is_success());
        assert_eq!(response.error_code(), u8::from(error.status()));
        assert_eq!(response.into_result(), Err(error));
    }
}

#[test]
fn test_unclassified_errors_become_remote_system_errors() {
    let response = RpcResponse::failure(1, &RpcError::Network("reset".into()));
    assert_eq!(response.status, RpcResultStatus::SystemError);
    assert_eq!(response.into_result(), Err(RpcError::Remote("reset".into())));
}

#[test]
fn test_codec_errors_surface_as_serialization_failures() {
    let err: RpcError = CodecError::Deserialize("unexpected end of input".into()).into();
    assert_eq!(
        err,
        RpcError::Serialization("deserialize error: unexpected end of input".into())
    );
    assert_eq!(err.status(), RpcResultStatus::SerializationError);
}
