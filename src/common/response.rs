use crate::Result;
use http::StatusCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writes a minimal `text/plain` HTTP/1.1 response and flushes it
///
/// Every denial and failure the fixtures produce carries an explanatory text
/// body; there is no silent denial.
pub async fn write_text_response<S>(
    stream: &mut S,
    status: StatusCode,
    extra_headers: &[(&str, &str)],
    body: &str,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        body.len(),
    );
    for (name, value) in extra_headers {
        response.push_str(name);
        response.push_str(": ");
        response.push_str(value);
        response.push_str("\r\n");
    }
    response.push_str("\r\n");
    response.push_str(body);

    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
