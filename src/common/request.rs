use crate::{FixtureError, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

// Request heads larger than this are rejected rather than buffered.
const MAX_REQUEST_HEAD: usize = 8192;

/// Parsed HTTP request head plus the raw bytes buffered while reading it
///
/// The fixture servers speak just enough HTTP/1.1 to route a request: the
/// request line, the headers, and whatever prefix of the body arrived in the
/// same segments. Anything beyond that is the client's business.
#[derive(Debug)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    headers: Vec<(String, Vec<u8>)>,
    /// Everything read from the stream so far, head included
    pub buffered: BytesMut,
    /// Length of the head within `buffered`
    pub head_len: usize,
}

impl RequestHead {
    /// Returns the value of the first header with the given name, ASCII case-insensitive
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_slice())
    }

    /// Iterates over `(name, value)` header pairs in wire order
    pub fn headers(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_slice()))
    }

    /// Bytes read past the end of the head (a prefix of the body, possibly empty)
    pub fn body_prefix(&self) -> &[u8] {
        &self.buffered[self.head_len..]
    }
}

/// Reads one HTTP/1.1 request head from the stream
///
/// Keeps reading until the head parses complete, the buffer cap is hit, or
/// the peer closes.
pub async fn read_request_head<S>(stream: &mut S) -> Result<RequestHead>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(1024);

    loop {
        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut request = httparse::Request::new(&mut headers);

        match request.parse(&buffer) {
            Ok(httparse::Status::Complete(head_len)) => {
                let method = request
                    .method
                    .ok_or_else(|| FixtureError::HttpParse("Request line missing method".to_string()))?
                    .to_string();
                let path = request
                    .path
                    .ok_or_else(|| FixtureError::HttpParse("Request line missing path".to_string()))?
                    .to_string();
                let headers = request
                    .headers
                    .iter()
                    .map(|header| (header.name.to_string(), header.value.to_vec()))
                    .collect();
                return Ok(RequestHead {
                    method,
                    path,
                    headers,
                    buffered: buffer,
                    head_len,
                });
            }
            Ok(httparse::Status::Partial) => {
                if buffer.len() >= MAX_REQUEST_HEAD {
                    return Err(FixtureError::HttpParse("Request head too large".to_string()));
                }
                let n = stream.read_buf(&mut buffer).await?;
                if n == 0 {
                    return Err(FixtureError::HttpParse(
                        "Connection closed before request head".to_string(),
                    ));
                }
            }
            Err(e) => {
                return Err(FixtureError::HttpParse(format!("Failed to parse request head: {e}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_method_path_and_headers() {
        let raw = b"GET /closed-by-server HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n\r\n";
        let mut stream = tokio_test::io::Builder::new().read(raw).build();

        let head = read_request_head(&mut stream).await.unwrap();
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/closed-by-server");
        assert_eq!(head.header("accept"), Some(&b"text/event-stream"[..]));
        assert_eq!(head.header("ACCEPT"), Some(&b"text/event-stream"[..]));
        assert_eq!(head.header("proxy-authorization"), None);
        assert!(head.body_prefix().is_empty());
    }

    #[tokio::test]
    async fn keeps_body_prefix_read_with_the_head() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let mut stream = tokio_test::io::Builder::new().read(raw).build();

        let head = read_request_head(&mut stream).await.unwrap();
        assert_eq!(head.method, "POST");
        assert_eq!(head.body_prefix(), b"hello");
    }

    #[tokio::test]
    async fn rejects_early_close() {
        let mut stream = tokio_test::io::Builder::new().read(b"GET / HT").build();

        let result = read_request_head(&mut stream).await;
        assert!(matches!(result, Err(FixtureError::HttpParse(_))));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let mut stream = tokio_test::io::Builder::new().read(b"\x00\x01\x02garbage\r\n\r\n").build();

        let result = read_request_head(&mut stream).await;
        assert!(matches!(result, Err(FixtureError::HttpParse(_))));
    }
}
