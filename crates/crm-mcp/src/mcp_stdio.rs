use rmcp::{
    RoleServer,
    service::{RxJsonRpcMessage, TxJsonRpcMessage},
    transport::Transport,
};
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
    time::{Duration, sleep},
};

pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FrameMode {
    Unknown = 0,
    Ndjson = 1,
    ContentLength = 2,
}

impl FrameMode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Ndjson,
            2 => Self::ContentLength,
            _ => Self::Unknown,
        }
    }

    /// Sniffs the framing from the first non-whitespace bytes a client sends.
    fn detect(buf: &[u8]) -> Option<Self> {
        let trimmed = buf.trim_ascii_start();
        if trimmed.is_empty() {
            return None;
        }
        if starts_with_ascii_case(trimmed, b"content-length:") {
            return Some(Self::ContentLength);
        }
        match trimmed.first() {
            Some(b'{') | Some(b'[') => Some(Self::Ndjson),
            _ => None,
        }
    }
}

/// Stdio transport that answers in whichever framing the client speaks:
/// newline-delimited JSON or LSP-style `Content-Length` headers.
pub struct HybridStdioTransport<R = tokio::io::Stdin, W = tokio::io::Stdout> {
    reader: R,
    writer: Arc<Mutex<W>>,
    mode: Arc<AtomicU8>,
    buf: Vec<u8>,
    // Prefix of `buf` already searched for a newline without a hit.
    scanned: usize,
}

impl HybridStdioTransport {
    pub fn new() -> Self {
        Self::from_parts(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for HybridStdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> HybridStdioTransport<R, W> {
    pub fn from_parts(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer: Arc::new(Mutex::new(writer)),
            mode: Arc::new(AtomicU8::new(FrameMode::Unknown as u8)),
            buf: Vec::with_capacity(16 * 1024),
            scanned: 0,
        }
    }

    fn mode(&self) -> FrameMode {
        FrameMode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    fn set_mode(&self, mode: FrameMode) {
        tracing::debug!(?mode, "detected mcp stdio framing");
        self.mode.store(mode as u8, Ordering::Relaxed);
    }

    fn next_newline(&mut self) -> Option<usize> {
        let from = self.scanned.min(self.buf.len());
        match self.buf[from..].iter().position(|b| *b == b'\n') {
            Some(idx) => {
                self.scanned = 0;
                Some(from + idx)
            }
            None => {
                self.scanned = self.buf.len();
                None
            }
        }
    }

    fn discard_oversized(&mut self) -> io::Error {
        let len = self.buf.len();
        self.buf.clear();
        self.scanned = 0;
        frame_too_large(len)
    }

    fn parse_ndjson_message(&mut self) -> io::Result<Option<RxJsonRpcMessage<RoleServer>>> {
        let Some(newline_idx) = self.next_newline() else {
            if self.buf.len() > MAX_FRAME_BYTES {
                return Err(self.discard_oversized());
            }
            return Ok(None);
        };
        let line: Vec<u8> = self.buf.drain(..=newline_idx).collect();
        if line.len() > MAX_FRAME_BYTES {
            return Err(frame_too_large(line.len()));
        }
        let line = line.trim_ascii();
        if line.is_empty() {
            return self.parse_ndjson_message();
        }
        serde_json::from_slice::<RxJsonRpcMessage<RoleServer>>(line)
            .map(Some)
            .map_err(|e| invalid_data(format!("invalid NDJSON MCP message: {e}")))
    }

    fn parse_content_length_message(
        &mut self,
    ) -> io::Result<Option<RxJsonRpcMessage<RoleServer>>> {
        let Some((header_end, sep_len)) = find_header_end(&self.buf) else {
            if self.buf.len() > MAX_FRAME_BYTES {
                return Err(self.discard_oversized());
            }
            return Ok(None);
        };
        let content_length = std::str::from_utf8(&self.buf[..header_end])
            .map_err(|e| invalid_data(format!("invalid content-length header utf8: {e}")))
            .and_then(parse_content_length)
            .and_then(|n| {
                if n > MAX_FRAME_BYTES {
                    Err(frame_too_large(n))
                } else {
                    Ok(n)
                }
            });
        let content_length = match content_length {
            Ok(n) => n,
            Err(err) => {
                self.buf.drain(..header_end + sep_len);
                return Err(err);
            }
        };

        let body_start = header_end + sep_len;
        let body_end = body_start + content_length;
        if self.buf.len() < body_end {
            return Ok(None);
        }
        let body: Vec<u8> = self.buf.drain(..body_end).skip(body_start).collect();
        serde_json::from_slice::<RxJsonRpcMessage<RoleServer>>(&body)
            .map(Some)
            .map_err(|e| invalid_data(format!("invalid Content-Length MCP body JSON: {e}")))
    }

    fn parse_buffered(&mut self) -> io::Result<Option<RxJsonRpcMessage<RoleServer>>> {
        match self.mode() {
            FrameMode::ContentLength => self.parse_content_length_message(),
            FrameMode::Ndjson => self.parse_ndjson_message(),
            FrameMode::Unknown => match FrameMode::detect(&self.buf) {
                Some(detected) => {
                    self.set_mode(detected);
                    self.parse_buffered()
                }
                None => self.skip_preamble_line(),
            },
        }
    }

    /// Drops a complete line that cannot open either framing (a shell banner,
    /// stray log output) so detection can retry on what follows it.
    fn skip_preamble_line(&mut self) -> io::Result<Option<RxJsonRpcMessage<RoleServer>>> {
        let Some(newline_idx) = self.next_newline() else {
            if self.buf.len() > MAX_FRAME_BYTES {
                return Err(self.discard_oversized());
            }
            return Ok(None);
        };
        let skipped: Vec<u8> = self.buf.drain(..=newline_idx).collect();
        if skipped.trim_ascii().is_empty() {
            return self.parse_buffered();
        }
        Err(invalid_data(format!(
            "skipped {} bytes that do not start an mcp frame",
            skipped.len()
        )))
    }
}

impl<R, W> Transport<RoleServer> for HybridStdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Error = io::Error;

    fn send(
        &mut self,
        item: TxJsonRpcMessage<RoleServer>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let writer = self.writer.clone();
        let mode = self.mode.clone();
        async move {
            let payload = serde_json::to_vec(&item)
                .map_err(|e| invalid_data(format!("failed to encode MCP response JSON: {e}")))?;
            let mut out = writer.lock().await;
            if FrameMode::from_u8(mode.load(Ordering::Relaxed)) == FrameMode::ContentLength {
                let header = format!("Content-Length: {}\r\n\r\n", payload.len());
                out.write_all(header.as_bytes()).await?;
                out.write_all(&payload).await?;
            } else {
                out.write_all(&payload).await?;
                out.write_all(b"\n").await?;
            }
            out.flush().await
        }
    }

    async fn receive(&mut self) -> Option<RxJsonRpcMessage<RoleServer>> {
        loop {
            match self.parse_buffered() {
                Ok(Some(msg)) => return Some(msg),
                Ok(None) => {}
                Err(err) => {
                    // The offending frame is already consumed from the buffer.
                    tracing::warn!(error = %err, "dropping undecodable mcp frame");
                    continue;
                }
            }

            let mut tmp = [0u8; 8192];
            let n = match self.reader.read(&mut tmp).await {
                Ok(n) => n,
                Err(err) if is_retryable_read_error(&err) => {
                    sleep(Duration::from_millis(2)).await;
                    continue;
                }
                Err(err) => {
                    tracing::error!(error = %err, "mcp stdio read failed");
                    return None;
                }
            };
            if n == 0 {
                // EOF: a final NDJSON message may lack its trailing newline.
                if self.mode() != FrameMode::ContentLength && !self.buf.is_empty() {
                    self.buf.push(b'\n');
                }
                return self.parse_buffered().unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "dropping trailing mcp frame");
                    None
                });
            }
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        let mut out = self.writer.lock().await;
        out.flush().await
    }
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn frame_too_large(len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::FileTooLarge,
        format!("mcp frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"),
    )
}

fn parse_content_length(headers: &str) -> io::Result<usize> {
    let mut content_length = None;
    for line in headers.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some((k, v)) = line.split_once(':')
            && k.trim().eq_ignore_ascii_case("content-length")
        {
            let n = v
                .trim()
                .parse::<usize>()
                .map_err(|e| invalid_data(format!("invalid Content-Length value: {e}")))?;
            content_length = Some(n);
        }
    }
    content_length
        .ok_or_else(|| invalid_data("missing Content-Length header in MCP frame".to_string()))
}

fn starts_with_ascii_case(haystack: &[u8], needle_lower: &[u8]) -> bool {
    haystack.len() >= needle_lower.len()
        && haystack
            .iter()
            .zip(needle_lower)
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
}

fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    if let Some(i) = find_subslice(buf, b"\r\n\r\n") {
        return Some((i, 4));
    }
    find_subslice(buf, b"\n\n").map(|i| (i, 2))
}

fn find_subslice(buf: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || buf.len() < needle.len() {
        return None;
    }
    buf.windows(needle.len()).position(|w| w == needle)
}

fn is_retryable_read_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    ) || matches!(err.raw_os_error(), Some(11) | Some(4))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PING: &str = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

    fn transport(input: Vec<u8>) -> HybridStdioTransport<std::io::Cursor<Vec<u8>>, Vec<u8>> {
        HybridStdioTransport::from_parts(std::io::Cursor::new(input), Vec::new())
    }

    #[test]
    fn framing_is_detected_from_first_bytes() {
        assert_eq!(
            FrameMode::detect(b"  Content-Length: 5\r\n"),
            Some(FrameMode::ContentLength)
        );
        assert_eq!(FrameMode::detect(b"\n{\"jsonrpc\""), Some(FrameMode::Ndjson));
        assert_eq!(FrameMode::detect(b"   "), None);
        assert_eq!(FrameMode::detect(b"GET / HTTP/1.1"), None);
    }

    #[test]
    fn header_end_detects_both_styles() {
        assert_eq!(
            find_header_end(b"Content-Length: 5\r\n\r\n{\"a\":1}"),
            Some((17, 4))
        );
        assert_eq!(
            find_header_end(b"Content-Length: 5\n\n{\"a\":1}"),
            Some((17, 2))
        );
        assert_eq!(find_header_end(b"Content-Length: 5\r\n"), None);
    }

    #[test]
    fn content_length_header_is_required_and_numeric() {
        assert_eq!(parse_content_length("content-length: 42").expect("len"), 42);
        assert!(parse_content_length("Content-Type: json").is_err());
        assert!(parse_content_length("Content-Length: lots").is_err());
    }

    #[tokio::test]
    async fn reads_ndjson_and_content_length_frames() {
        let mut t = transport(format!("{PING}\n").into_bytes());
        assert!(t.receive().await.is_some());
        assert_eq!(t.mode(), FrameMode::Ndjson);

        let framed = format!("Content-Length: {}\r\n\r\n{PING}", PING.len());
        let mut t = transport(framed.into_bytes());
        assert!(t.receive().await.is_some());
        assert_eq!(t.mode(), FrameMode::ContentLength);
    }

    #[tokio::test]
    async fn final_ndjson_message_without_newline_is_read() {
        let mut t = transport(PING.as_bytes().to_vec());
        assert!(t.receive().await.is_some());
        assert!(t.receive().await.is_none());
    }

    #[tokio::test]
    async fn oversized_content_length_frame_is_rejected() {
        let header = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_BYTES + 1);
        let mut t = transport(header.into_bytes());
        assert!(t.receive().await.is_none());
        assert!(t.buf.is_empty());
    }

    #[tokio::test]
    async fn garbage_line_is_skipped() {
        let mut t = transport(format!("{{not json\n{PING}\n").into_bytes());
        assert!(t.receive().await.is_some());
    }

    #[tokio::test]
    async fn banner_before_first_frame_is_skipped() {
        let mut t = transport(format!("hello\n\n{PING}\n").into_bytes());
        assert!(t.receive().await.is_some());
        assert_eq!(t.mode(), FrameMode::Ndjson);

        let framed = format!(
            "starting up...\r\nContent-Length: {}\r\n\r\n{PING}",
            PING.len()
        );
        let mut t = transport(framed.into_bytes());
        assert!(t.receive().await.is_some());
        assert_eq!(t.mode(), FrameMode::ContentLength);
    }

    #[tokio::test]
    async fn oversized_preamble_is_capped_and_later_frames_still_arrive() {
        let mut input = b"hello\n".to_vec();
        input.extend(std::iter::repeat_n(b'x', MAX_FRAME_BYTES + 10));
        input.push(b'\n');
        input.extend_from_slice(format!("{PING}\n").as_bytes());
        let mut t = transport(input);
        assert!(t.receive().await.is_some());
        assert_eq!(t.mode(), FrameMode::Ndjson);
        assert!(t.buf.len() <= MAX_FRAME_BYTES);
    }

    #[tokio::test]
    async fn endless_unframed_input_never_exceeds_the_cap() {
        let mut t = transport(vec![b'x'; MAX_FRAME_BYTES * 2]);
        assert!(t.receive().await.is_none());
        assert!(t.buf.is_empty());
        assert_eq!(t.mode(), FrameMode::Unknown);
    }

    #[test]
    fn retryable_read_errors_cover_wouldblock_and_interrupted() {
        assert!(is_retryable_read_error(&io::Error::from(
            io::ErrorKind::WouldBlock
        )));
        assert!(is_retryable_read_error(&io::Error::from(
            io::ErrorKind::Interrupted
        )));
        assert!(!is_retryable_read_error(&io::Error::from(
            io::ErrorKind::BrokenPipe
        )));
    }
}
