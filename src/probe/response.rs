use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 8 * 1024;
const MAX_HEAD_BYTES: usize = 64 * 1024;
const MAX_HEADERS: usize = 256;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Connection may carry another request: keep-alive and the body was framed and read whole.
    pub keep_alive: bool,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Non-empty `Location` value.
    pub fn location(&self) -> Option<&str> {
        self.header("location")
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Status line and headers of one response, copied out of the read buffer.
struct Head {
    status: u16,
    http10: bool,
    headers: Vec<(String, String)>,
}

fn owned_headers(headers: &[httparse::Header<'_>]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).trim().to_string(),
            )
        })
        .collect()
}

fn parse_head(buf: &[u8]) -> io::Result<Option<(Head, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(buf) {
        Ok(httparse::Status::Complete(len)) => {
            let status = response
                .code
                .ok_or_else(|| invalid("response without a status code"))?;
            let head = Head {
                status,
                http10: response.version == Some(0),
                headers: owned_headers(response.headers),
            };
            Ok(Some((head, len)))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(e) => Err(invalid(format!("malformed response head: {e}"))),
    }
}

fn parse_chunk_size(buf: &[u8]) -> io::Result<Option<(usize, usize)>> {
    match httparse::parse_chunk_size(buf) {
        Ok(httparse::Status::Complete((len, size))) => {
            let size = usize::try_from(size).map_err(|_| invalid("chunk too large"))?;
            Ok(Some((size, len)))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(_) => Err(invalid("bad chunk size")),
    }
}

fn parse_trailers(buf: &[u8]) -> io::Result<Option<((), usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    match httparse::parse_headers(buf, &mut headers) {
        Ok(httparse::Status::Complete((len, _))) => Ok(Some(((), len))),
        Ok(httparse::Status::Partial) => Ok(None),
        Err(e) => Err(invalid(format!("malformed trailers: {e}"))),
    }
}

fn parse_chunk_end(buf: &[u8]) -> io::Result<Option<((), usize)>> {
    if buf.starts_with(b"\r\n") {
        Ok(Some(((), 2)))
    } else if buf.starts_with(b"\n") {
        Ok(Some(((), 1)))
    } else if buf.is_empty() || buf == b"\r" {
        Ok(None)
    } else {
        Err(invalid("chunk data not followed by a line break"))
    }
}

struct Buffered<'a, R> {
    inner: &'a mut R,
    buf: Vec<u8>,
    pos: usize,
}

impl<'a, R: AsyncRead + Unpin> Buffered<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
            pos: 0,
        }
    }

    fn pending(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    async fn fill(&mut self) -> io::Result<usize> {
        if self.pos > 0 && self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
        let start = self.buf.len();
        self.buf.resize(start + READ_CHUNK, 0);
        let n = self.inner.read(&mut self.buf[start..]).await?;
        self.buf.truncate(start + n);
        Ok(n)
    }

    /// Runs `parse` over the unread bytes, reading more until it reports a complete item.
    async fn parse_with<T, F>(&mut self, parse: F) -> io::Result<T>
    where
        F: Fn(&[u8]) -> io::Result<Option<(T, usize)>>,
    {
        loop {
            if let Some((item, used)) = parse(self.pending())? {
                self.pos += used;
                return Ok(item);
            }
            if self.pending().len() > MAX_HEAD_BYTES {
                return Err(invalid("response head too large"));
            }
            if self.fill().await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-response",
                ));
            }
        }
    }

    /// Appends up to `n` bytes to `out`, never letting `out` grow beyond `limit`. Returns false
    /// when the cap cut the read short.
    async fn take(&mut self, mut n: usize, out: &mut Vec<u8>, limit: usize) -> io::Result<bool> {
        while n > 0 {
            if self.pending().is_empty() && self.fill().await? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-body",
                ));
            }
            let room = limit.saturating_sub(out.len());
            let step = n.min(self.pending().len());
            if step > room {
                out.extend_from_slice(&self.pending()[..room]);
                return Ok(false);
            }
            out.extend_from_slice(&self.pending()[..step]);
            self.pos += step;
            n -= step;
        }
        Ok(true)
    }

    async fn take_to_eof(&mut self, out: &mut Vec<u8>, limit: usize) -> io::Result<()> {
        loop {
            let room = limit.saturating_sub(out.len());
            let step = room.min(self.pending().len());
            out.extend_from_slice(&self.pending()[..step]);
            self.pos += step;
            if out.len() >= limit {
                return Ok(());
            }
            if self.fill().await? == 0 {
                return Ok(());
            }
        }
    }
}

enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

/// Reads one final response, skipping interim `1xx` ones. Bodies longer than `limit` are cut
/// off and the connection is marked unusable.
pub async fn read_response<R>(reader: &mut R, limit: usize) -> io::Result<RawResponse>
where
    R: AsyncRead + Unpin,
{
    let mut input = Buffered::new(reader);
    loop {
        let head = input.parse_with(parse_head).await?;
        if (100..200).contains(&head.status) {
            continue;
        }

        let mut response = RawResponse {
            status: head.status,
            headers: head.headers,
            body: Vec::new(),
            keep_alive: false,
        };
        let connection = response.header("connection").map(str::to_ascii_lowercase);
        let mut keep_alive = match connection.as_deref() {
            Some(c) if c.contains("close") => false,
            Some(c) if c.contains("keep-alive") => true,
            _ => !head.http10,
        };

        let mut body = Vec::new();
        match framing(&response)? {
            Framing::Empty => {}
            Framing::Length(n) => {
                if !input.take(n, &mut body, limit).await? {
                    keep_alive = false;
                }
            }
            Framing::Chunked => {
                if !read_chunked(&mut input, &mut body, limit).await? {
                    keep_alive = false;
                }
            }
            Framing::UntilClose => {
                input.take_to_eof(&mut body, limit).await?;
                keep_alive = false;
            }
        }
        response.body = body;
        response.keep_alive = keep_alive;
        return Ok(response);
    }
}

fn framing(response: &RawResponse) -> io::Result<Framing> {
    if matches!(response.status, 204 | 304) {
        return Ok(Framing::Empty);
    }
    if let Some(te) = response.header("transfer-encoding") {
        if te.to_ascii_lowercase().contains("chunked") {
            return Ok(Framing::Chunked);
        }
    }
    match response.header("content-length") {
        Some(len) => len
            .trim()
            .parse::<usize>()
            .map(Framing::Length)
            .map_err(|_| invalid(format!("bad content-length {len:?}"))),
        None => Ok(Framing::UntilClose),
    }
}

async fn read_chunked<R: AsyncRead + Unpin>(
    input: &mut Buffered<'_, R>,
    body: &mut Vec<u8>,
    limit: usize,
) -> io::Result<bool> {
    loop {
        let size = input.parse_with(parse_chunk_size).await?;
        if size == 0 {
            input.parse_with(parse_trailers).await?;
            return Ok(true);
        }
        if !input.take(size, body, limit).await? {
            return Ok(false);
        }
        input.parse_with(parse_chunk_end).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &[u8], limit: usize) -> io::Result<RawResponse> {
        let mut reader = raw;
        read_response(&mut reader, limit).await
    }

    #[tokio::test]
    async fn content_length_body() {
        let resp = parse(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nServer: x\r\n\r\nhello",
            1024,
        )
        .await
        .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"hello");
        assert_eq!(resp.header("SERVER"), Some("x"));
        assert!(resp.keep_alive);
    }

    #[tokio::test]
    async fn chunked_body_is_reassembled() {
        let resp = parse(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nX-Trailer: y\r\n\r\n",
            1024,
        )
        .await
        .unwrap();
        assert_eq!(resp.body, b"Wikipedia");
        assert!(resp.keep_alive);
    }

    #[tokio::test]
    async fn unframed_body_reads_to_close() {
        let resp = parse(b"HTTP/1.0 403 Forbidden\r\n\r\ndenied", 1024)
            .await
            .unwrap();
        assert_eq!(resp.status, 403);
        assert_eq!(resp.body, b"denied");
        assert!(!resp.keep_alive);
    }

    #[tokio::test]
    async fn interim_responses_are_skipped() {
        let resp = parse(
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 301 Moved\r\nLocation: /admin\r\nContent-Length: 0\r\n\r\n",
            1024,
        )
        .await
        .unwrap();
        assert_eq!(resp.status, 301);
        assert_eq!(resp.location(), Some("/admin"));
        assert!(resp.body.is_empty());
    }

    #[tokio::test]
    async fn no_content_has_no_body() {
        let resp = parse(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n", 1024)
            .await
            .unwrap();
        assert_eq!(resp.status, 204);
        assert!(resp.body.is_empty());
        assert!(!resp.keep_alive);
    }

    #[tokio::test]
    async fn oversized_body_is_capped() {
        let resp = parse(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n0123456789", 4)
            .await
            .unwrap();
        assert_eq!(resp.body, b"0123");
        assert!(!resp.keep_alive);
    }

    #[tokio::test]
    async fn garbage_and_truncation_are_errors() {
        assert_eq!(
            parse(b"SSH-2.0-OpenSSH\r\n\r\n", 1024).await.unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
        assert_eq!(
            parse(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort", 1024)
                .await
                .unwrap_err()
                .kind(),
            io::ErrorKind::UnexpectedEof
        );
        assert_eq!(
            parse(b"", 1024).await.unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }

    #[tokio::test]
    async fn malformed_header_line_is_invalid() {
        assert_eq!(
            parse(b"HTTP/1.1 200 OK\r\nBad Header Line\r\n\r\n", 1024)
                .await
                .unwrap_err()
                .kind(),
            io::ErrorKind::InvalidData
        );
        assert_eq!(
            parse(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n", 1024)
                .await
                .unwrap_err()
                .kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[tokio::test]
    async fn bare_lf_line_endings_are_accepted() {
        let resp = parse(b"HTTP/1.1 404 Not Found\nContent-Length: 2\n\nno", 1024)
            .await
            .unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, b"no");
    }
}
