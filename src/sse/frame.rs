use std::fmt::Display;

/// Response head that switches the connection into a long-lived event stream
pub const STREAM_RESPONSE_HEAD: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/event-stream\r\n\
Cache-Control: no-cache\r\n\
Connection: keep-alive\r\n\
\r\n";

/// Encodes one server-sent event with an event name and a data payload
///
/// Produces the two-field wire form terminated by a blank line:
///
/// ```text
/// event: counter
/// data: 3
///
/// ```
pub fn encode_event(name: &str, data: impl Display) -> String {
    format!("event: {name}\ndata: {data}\n\n")
}
