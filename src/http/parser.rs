use crate::http::request::Request;

#[derive(Debug)]
pub enum ParseError {
    InvalidRequest,
    InvalidHeader,
    InvalidContentLength,
    UnsupportedTransferEncoding,
    Incomplete,
}

pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {

    // Look for header/body separator
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let header_bytes = &buf[..headers_end];
    let body_bytes = &buf[headers_end + 4..];

    let mut lines = header_bytes.split(|&b| b == b'\n').map(strip_cr);

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let request_line = std::str::from_utf8(request_line)
        .map_err(|_| ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method = parts.next().ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidRequest);
    }

    // Headers. Names must be text; values stay raw.
    let mut headers = Vec::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or(ParseError::InvalidHeader)?;

        let name = std::str::from_utf8(&line[..colon])
            .map_err(|_| ParseError::InvalidHeader)?
            .trim();
        if name.is_empty() {
            return Err(ParseError::InvalidHeader);
        }

        headers.push((name.to_string(), trim_bytes(&line[colon + 1..]).to_vec()));
    }

    if headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("Transfer-Encoding"))
    {
        return Err(ParseError::UnsupportedTransferEncoding);
    }

    // Body
    let content_length = headers
        .iter()
        .rev()
        .find(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
        .map(|(_, value)| {
            std::str::from_utf8(value)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .ok_or(ParseError::InvalidContentLength)
        })
        .transpose()?
        .unwrap_or(0);

    if body_bytes.len() < content_length {
        return Err(ParseError::Incomplete);
    }

    let body = body_bytes[..content_length].to_vec();

    let request = Request {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        headers,
        body,
        remote_addr: None,
    };

    let total_consumed = headers_end + 4 + content_length;
    Ok((request, total_consumed))

}

pub(crate) fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn trim_bytes(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET /proxy?route=/items HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.path(), "/proxy");
        assert_eq!(parsed.header("Host").unwrap(), "example.com");
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn trims_header_value_bytes() {
        assert_eq!(trim_bytes(b"  a b \t"), b"a b");
        assert_eq!(trim_bytes(b"   "), b"");
    }
}
