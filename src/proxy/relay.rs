//! Turns a parsed upstream response into the response sent to the caller.

use crate::http::response::{Response, ResponseBuilder};
use crate::proxy::response::ParsedResponse;

/// Header names never copied to the caller. `Content-Length` is recomputed
/// from the body when the response is built.
pub const SUPPRESSED_HEADERS: [&str; 2] = ["status", "Content-Length"];

pub fn relay(parsed: ParsedResponse) -> Response {
    let ParsedResponse {
        status,
        headers,
        body,
        ..
    } = parsed;

    let mut builder = ResponseBuilder::new(status);
    for (name, value) in headers {
        if SUPPRESSED_HEADERS
            .iter()
            .any(|suppressed| name.eq_ignore_ascii_case(suppressed))
        {
            continue;
        }
        builder = builder.header(name, value);
    }

    builder.body(body).build()
}
