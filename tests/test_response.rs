use dtnweb::http::response::{Response, ResponseBuilder, StatusCode};
use dtnweb::http::writer::{encode_head, encode_response};

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::SwitchingProtocols.as_u16(), 101);
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::PartialContent.as_u16(), 206);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::MethodNotAllowed.as_u16(), 405);
    assert_eq!(StatusCode::RangeNotSatisfiable.as_u16(), 416);
    assert_eq!(StatusCode::UpgradeRequired.as_u16(), 426);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::SwitchingProtocols.reason_phrase(), "Switching Protocols");
    assert_eq!(StatusCode::PartialContent.reason_phrase(), "Partial Content");
    assert_eq!(StatusCode::RangeNotSatisfiable.reason_phrase(), "Range Not Satisfiable");
    assert_eq!(StatusCode::UpgradeRequired.reason_phrase(), "Upgrade Required");
}

#[test]
fn test_response_builder_auto_content_length() {
    let body = b"This is the body".to_vec();
    let response = ResponseBuilder::new(StatusCode::Ok).body(body.clone()).build();

    assert_eq!(response.header("Content-Length"), Some(body.len().to_string().as_str()));
}

#[test]
fn test_response_builder_preserves_custom_content_length() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("content-length", "999")
        .body(b"test".to_vec())
        .build();

    assert_eq!(response.headers.len(), 1);
    assert_eq!(response.header("Content-Length"), Some("999"));
}

#[test]
fn test_switching_protocols_has_no_content_length() {
    let response = ResponseBuilder::new(StatusCode::SwitchingProtocols)
        .header("Upgrade", "websocket")
        .build();

    assert_eq!(response.header("Content-Length"), None);
}

#[test]
fn test_response_builder_replaces_header() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", "text/plain")
        .header("content-type", "text/html")
        .build();

    assert_eq!(response.headers.len(), 2); // 1 custom + 1 auto (Content-Length)
    assert_eq!(response.header("Content-Type"), Some("text/html"));
}

#[test]
fn test_encode_response_keeps_header_order() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("X-First", "1")
        .header("X-Second", "2")
        .body(b"hi".to_vec())
        .build();

    assert_eq!(
        encode_response(&response),
        b"HTTP/1.1 200 OK\r\nX-First: 1\r\nX-Second: 2\r\nContent-Length: 2\r\n\r\nhi".to_vec()
    );
    assert!(encode_head(&response).ends_with(b"\r\n\r\n"));
}

#[test]
fn test_range_not_satisfiable_reports_total() {
    let response = Response::range_not_satisfiable(10);

    assert_eq!(response.status, StatusCode::RangeNotSatisfiable);
    assert_eq!(response.header("Content-Range"), Some("bytes */10"));
    assert_eq!(response.header("Content-Length"), Some("0"));
}

#[test]
fn test_response_helpers() {
    assert_eq!(Response::not_found().body, b"404 Not Found".to_vec());
    assert_eq!(Response::method_not_allowed().header("Allow"), Some("GET"));
    assert_eq!(Response::internal_error().status, StatusCode::InternalServerError);
    assert_eq!(Response::ok(b"x".to_vec()).header("Content-Length"), Some("1"));
}
