/// HTTP status codes produced by the server.
///
/// - `SwitchingProtocols` (101): WebSocket upgrade accepted
/// - `Ok` (200): Full file
/// - `PartialContent` (206): Byte range of a file
/// - `BadRequest` (400): Request the server refuses to interpret
/// - `Forbidden` (403): Path escapes the document root
/// - `NotFound` (404): No such file
/// - `MethodNotAllowed` (405): Anything but GET
/// - `RangeNotSatisfiable` (416): Range outside the file
/// - `UpgradeRequired` (426): Unsupported WebSocket version
/// - `InternalServerError` (500): I/O failure while reading a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 101 Switching Protocols
    SwitchingProtocols,
    /// 200 OK
    Ok,
    /// 206 Partial Content
    PartialContent,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 416 Range Not Satisfiable
    RangeNotSatisfiable,
    /// 426 Upgrade Required
    UpgradeRequired,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use dtnweb::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::RangeNotSatisfiable.as_u16(), 416);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::SwitchingProtocols => 101,
            StatusCode::Ok => 200,
            StatusCode::PartialContent => 206,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::RangeNotSatisfiable => 416,
            StatusCode::UpgradeRequired => 426,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::SwitchingProtocols => "Switching Protocols",
            StatusCode::Ok => "OK",
            StatusCode::PartialContent => "Partial Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::RangeNotSatisfiable => "Range Not Satisfiable",
            StatusCode::UpgradeRequired => "Upgrade Required",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

/// A response ready to be serialized.
///
/// Headers keep their insertion order on the wire.
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// HTTP headers in wire order
    pub headers: Vec<(String, String)>,
    /// Response body; empty for streamed file responses
    pub body: Vec<u8>,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```
/// # use dtnweb::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(b"{}".to_vec())
///     .build();
/// assert_eq!(response.header("content-length"), Some("2"));
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Adds a header, replacing an earlier one with the same (case-insensitive) name.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((key, value)),
        }
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Builds the final Response.
    ///
    /// Adds `Content-Length` from the body size unless already present. 101 responses
    /// never carry one.
    pub fn build(self) -> Response {
        let needs_length = self.status != StatusCode::SwitchingProtocols
            && !self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("Content-Length"));
        let len = self.body.len();
        let builder = if needs_length {
            self.header("Content-Length", len.to_string())
        } else {
            self
        };
        Response {
            status: builder.status,
            headers: builder.headers,
            body: builder.body,
        }
    }
}

impl Response {
    /// Creates a simple 200 OK response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(StatusCode::Ok).body(body.into()).build()
    }

    pub fn not_found() -> Self {
        Self::plain(StatusCode::NotFound)
    }

    pub fn forbidden() -> Self {
        Self::plain(StatusCode::Forbidden)
    }

    pub fn bad_request() -> Self {
        Self::plain(StatusCode::BadRequest)
    }

    pub fn method_not_allowed() -> Self {
        ResponseBuilder::new(StatusCode::MethodNotAllowed)
            .header("Allow", "GET")
            .body(b"405 Method Not Allowed".to_vec())
            .build()
    }

    pub fn internal_error() -> Self {
        Self::plain(StatusCode::InternalServerError)
    }

    /// 416 carrying `Content-Range: bytes */total`.
    pub fn range_not_satisfiable(total: u64) -> Self {
        ResponseBuilder::new(StatusCode::RangeNotSatisfiable)
            .header("Content-Range", format!("bytes */{total}"))
            .build()
    }

    fn plain(status: StatusCode) -> Self {
        ResponseBuilder::new(status)
            .header("Content-Type", "text/plain")
            .body(format!("{} {}", status.as_u16(), status.reason_phrase()).into_bytes())
            .build()
    }

    /// First value of the header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
