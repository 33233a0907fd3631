//! Request-side helpers layered over a parsed [`HttpMessage`](crate::http::message::HttpMessage).

/// HTTP request methods.
///
/// Only GET is served; the others are recognised so they can be answered with
/// 405 Method Not Allowed instead of being treated as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    OPTIONS,
    PATCH,
    CONNECT,
    TRACE,
}

impl Method {
    /// Parses a method token. Methods are case-sensitive.
    ///
    /// # Example
    ///
    /// ```
    /// # use dtnweb::http::request::Method;
    /// assert_eq!(Method::from_bytes(b"GET"), Some(Method::GET));
    /// assert_eq!(Method::from_bytes(b"get"), None);
    /// ```
    pub fn from_bytes(s: &[u8]) -> Option<Self> {
        match s {
            b"GET" => Some(Method::GET),
            b"HEAD" => Some(Method::HEAD),
            b"POST" => Some(Method::POST),
            b"PUT" => Some(Method::PUT),
            b"DELETE" => Some(Method::DELETE),
            b"OPTIONS" => Some(Method::OPTIONS),
            b"PATCH" => Some(Method::PATCH),
            b"CONNECT" => Some(Method::CONNECT),
            b"TRACE" => Some(Method::TRACE),
            _ => None,
        }
    }
}

/// A single `bytes=from-to` range.
///
/// `to == None` means "until the end of the file". A literal `to` of zero is read the
/// same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub from: u64,
    pub to: Option<u64>,
}

/// The requested range lies outside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsatisfiable;

impl ByteRange {
    /// Parses a `Range` header value. Multi-range, suffix and malformed values give
    /// `None`, in which case the whole file is served.
    pub fn parse(value: &[u8]) -> Option<Self> {
        let value = std::str::from_utf8(value).ok()?.trim();
        let ranges = value.strip_prefix("bytes=")?.trim();
        if ranges.contains(',') {
            return None;
        }
        let (from, to) = ranges.split_once('-')?;
        let from = from.trim();
        let to = to.trim();
        if from.is_empty() || !from.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let from = from.parse().ok()?;
        let to = match to {
            "" => None,
            digits if digits.bytes().all(|b| b.is_ascii_digit()) => match digits.parse().ok()? {
                0 => None,
                n => Some(n),
            },
            _ => return None,
        };
        Some(ByteRange { from, to })
    }

    /// Resolves the range against a file of `total` bytes into an inclusive
    /// `(first, last)` byte pair.
    pub fn resolve(&self, total: u64) -> Result<(u64, u64), Unsatisfiable> {
        if self.from >= total {
            return Err(Unsatisfiable);
        }
        let last = match self.to {
            Some(to) if to < self.from => return Err(Unsatisfiable),
            Some(to) => to.min(total - 1),
            None => total - 1,
        };
        Ok((self.from, last))
    }
}

/// Compares a `Host` header value with a bound domain, ignoring case and any port.
pub fn host_matches(host: &[u8], domain: &str) -> bool {
    let Ok(host) = std::str::from_utf8(host) else {
        return false;
    };
    let host = host.trim();
    let name = if host.starts_with('[') {
        host.split_once(']').map_or(host, |(v6, _)| &host[..v6.len() + 1])
    } else {
        host.split_once(':').map_or(host, |(name, _)| name)
    };
    let name = name.trim_end_matches('.');
    !name.is_empty() && name.eq_ignore_ascii_case(domain.trim_end_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_zero_means_end_of_file() {
        let range = ByteRange::parse(b"bytes=5-0").unwrap();
        assert_eq!(range.to, None);
        assert_eq!(range.resolve(10), Ok((5, 9)));
    }

    #[test]
    fn host_ipv6_literal() {
        assert!(host_matches(b"[::1]:8443", "[::1]"));
        assert!(!host_matches(b"[::1]:8443", "::1"));
    }
}
