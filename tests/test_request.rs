use dtnweb::http::request::{ByteRange, Method, Unsatisfiable, host_matches};

#[test]
fn test_request_method_from_bytes() {
    assert_eq!(Method::from_bytes(b"GET"), Some(Method::GET));
    assert_eq!(Method::from_bytes(b"POST"), Some(Method::POST));
    assert_eq!(Method::from_bytes(b"INVALID"), None);
    assert_eq!(Method::from_bytes(b"get"), None); // Case-sensitive
}

#[test]
fn test_request_method_equality() {
    assert_eq!(Method::GET, Method::GET);
    assert_ne!(Method::GET, Method::HEAD);
}

#[test]
fn test_range_parsing() {
    assert_eq!(ByteRange::parse(b"bytes=0-3"), Some(ByteRange { from: 0, to: Some(3) }));
    assert_eq!(ByteRange::parse(b"bytes=7-"), Some(ByteRange { from: 7, to: None }));
    assert_eq!(ByteRange::parse(b"bytes= 2 - 4 "), Some(ByteRange { from: 2, to: Some(4) }));
}

#[test]
fn test_range_malformed_is_ignored() {
    assert_eq!(ByteRange::parse(b"bytes=0-1,4-5"), None);
    assert_eq!(ByteRange::parse(b"bytes=-5"), None);
    assert_eq!(ByteRange::parse(b"items=0-1"), None);
    assert_eq!(ByteRange::parse(b"bytes=a-b"), None);
    assert_eq!(ByteRange::parse(b"bytes=1"), None);
}

#[test]
fn test_range_resolution() {
    let range = ByteRange { from: 0, to: Some(3) };
    assert_eq!(range.resolve(10), Ok((0, 3)));

    // Past the end is clamped
    let range = ByteRange { from: 8, to: Some(100) };
    assert_eq!(range.resolve(10), Ok((8, 9)));

    let range = ByteRange { from: 10, to: None };
    assert_eq!(range.resolve(10), Err(Unsatisfiable));

    let range = ByteRange { from: 5, to: Some(2) };
    assert_eq!(range.resolve(10), Err(Unsatisfiable));

    let range = ByteRange { from: 0, to: None };
    assert_eq!(range.resolve(0), Err(Unsatisfiable));
}

#[test]
fn test_host_matches_domain() {
    assert!(host_matches(b"example.com", "example.com"));
    assert!(host_matches(b"Example.COM:8443", "example.com"));
    assert!(host_matches(b"example.com.", "example.com"));
    assert!(!host_matches(b"other.example.com", "example.com"));
    assert!(!host_matches(b"", "example.com"));
}
