use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes the status line and headers, up to and including the blank line.
pub fn encode_head(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + resp.headers.len() * 32);

    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    for (k, v) in &resp.headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");
    buf
}

/// Serializes the whole response, body included.
pub fn encode_response(resp: &Response) -> Vec<u8> {
    let mut buf = encode_head(resp);
    buf.extend_from_slice(&resp.body);
    buf
}
