//! Request-target grammar (RFC 9112 §3.2) and path normalisation (RFC 3986 §5.2.4).

use url::Url;

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

fn is_sub_delim(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'='
    )
}

/// `pchar / "/" / "?"`, with percent-encodings checked separately.
fn is_target_char(b: u8) -> bool {
    is_unreserved(b) || is_sub_delim(b) || matches!(b, b':' | b'@' | b'/' | b'?' | b'%')
}

fn has_valid_escapes(target: &[u8]) -> bool {
    target
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'%')
        .all(|(i, _)| {
            target.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && target.get(i + 2).is_some_and(u8::is_ascii_hexdigit)
        })
}

fn is_origin_form(target: &[u8]) -> bool {
    target.starts_with(b"/") && target.iter().all(|b| is_target_char(*b)) && has_valid_escapes(target)
}

fn is_absolute_form(target: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(target) else {
        return false;
    };
    text.contains("://")
        && !text.contains('#')
        && Url::parse(text).is_ok_and(|url| url.has_host())
}

fn is_authority_form(target: &[u8]) -> bool {
    let Some(colon) = target.iter().rposition(|b| *b == b':') else {
        return false;
    };
    let (host, port) = (&target[..colon], &target[colon + 1..]);
    !host.is_empty()
        && !port.is_empty()
        && port.iter().all(u8::is_ascii_digit)
        && host.iter().all(|b| is_unreserved(*b) || is_sub_delim(*b) || matches!(*b, b'[' | b']' | b':'))
}

/// Validates a request-target in origin, absolute, authority or asterisk form.
pub fn is_valid_request_target(target: &[u8]) -> bool {
    match target.first() {
        None => false,
        Some(b'/') => is_origin_form(target),
        Some(b'*') => target.len() == 1,
        Some(_) => is_absolute_form(target) || is_authority_form(target),
    }
}

/// Extracts the decoded, dot-segment-free path of a request-target.
///
/// Returns `None` for targets without a path (asterisk and authority form) or when
/// the percent-decoded path is not UTF-8.
pub fn request_path(target: &str) -> Option<String> {
    let raw = if target.starts_with('/') {
        target.split(['?', '#']).next().unwrap_or("/").to_string()
    } else if is_absolute_form(target.as_bytes()) {
        Url::parse(target).ok()?.path().to_string()
    } else {
        return None;
    };
    let decoded = urlencoding::decode(&raw).ok()?;
    Some(remove_dot_segments(&decoded))
}

/// RFC 3986 §5.2.4 `remove_dot_segments`.
pub fn remove_dot_segments(path: &str) -> String {
    let mut input = path;
    let mut output = String::with_capacity(path.len());

    while !input.is_empty() {
        if let Some(rest) = input.strip_prefix("../") {
            input = rest;
        } else if let Some(rest) = input.strip_prefix("./") {
            input = rest;
        } else if input.starts_with("/./") {
            input = &input[2..];
        } else if input == "/." {
            input = "/";
        } else if input.starts_with("/../") {
            input = &input[3..];
            pop_segment(&mut output);
        } else if input == "/.." {
            input = "/";
            pop_segment(&mut output);
        } else if input == "." || input == ".." {
            input = "";
        } else {
            let skip = usize::from(input.starts_with('/'));
            let end = input[skip..].find('/').map_or(input.len(), |i| i + skip);
            output.push_str(&input[..end]);
            input = &input[end..];
        }
    }
    output
}

fn pop_segment(output: &mut String) {
    match output.rfind('/') {
        Some(i) => output.truncate(i),
        None => output.clear(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3986_examples() {
        assert_eq!(remove_dot_segments("/a/b/c/./../../g"), "/a/g");
        assert_eq!(remove_dot_segments("mid/content=5/../6"), "mid/6");
        assert_eq!(remove_dot_segments("/../../etc/passwd"), "/etc/passwd");
        assert_eq!(remove_dot_segments("/a/.."), "/");
    }

    #[test]
    fn target_forms() {
        assert!(is_valid_request_target(b"/"));
        assert!(is_valid_request_target(b"/index.html?x=1&y=%20"));
        assert!(is_valid_request_target(b"*"));
        assert!(is_valid_request_target(b"http://example.com/a"));
        assert!(is_valid_request_target(b"example.com:443"));
        assert!(!is_valid_request_target(b"/bad%zz"));
        assert!(!is_valid_request_target(b"/a\"b"));
        assert!(!is_valid_request_target(b"relative/path"));
    }

    #[test]
    fn request_path_decodes_then_normalises() {
        assert_eq!(request_path("/a/%2e%2e/b?q=1").as_deref(), Some("/b"));
        assert_eq!(request_path("http://example.com/x/./y").as_deref(), Some("/x/y"));
        assert_eq!(request_path("*"), None);
    }
}
