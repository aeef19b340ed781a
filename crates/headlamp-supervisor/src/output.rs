use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Which pipe of the child a line came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// A single line of dashboard output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLine {
    pub pid: Option<u32>,
    pub stream: OutputStream,
    pub line: String,
}

/// Log one line: stdout at info, stderr at error
fn log_line(pid: Option<u32>, stream: OutputStream, line: &str) {
    match stream {
        OutputStream::Stdout => info!(pid = ?pid, "Headlamp server stdout: {}", line),
        OutputStream::Stderr => error!(pid = ?pid, "Headlamp server stderr: {}", line),
    }
}

/// Drain a child pipe line by line until EOF or cancellation.
///
/// Lines are decoded lossily; the pipe must stay open while the child runs,
/// or its next write fails with EPIPE.
pub(crate) fn spawn_line_stream<R>(
    reader: R,
    pid: Option<u32>,
    stream: OutputStream,
    output_tx: Option<mpsc::UnboundedSender<OutputLine>>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            tokio::select! {
                _ = cancel.cancelled() => break,

                result = reader.read_until(b'\n', &mut buf) => {
                    match result {
                        // Pipe closed (process exited)
                        Ok(0) => break,
                        Ok(_) => {
                            let line = decode_line(&buf);
                            log_line(pid, stream, &line);

                            if let Some(tx) = &output_tx {
                                // Receiver gone is fine, keep logging
                                let _ = tx.send(OutputLine {
                                    pid,
                                    stream,
                                    line,
                                });
                            }
                        }
                        Err(e) => {
                            warn!(pid = ?pid, stream = stream.as_str(), error = %e, "Failed to read dashboard output");
                            break;
                        }
                    }
                }
            }
        }
    })
}

/// Strip the line terminator and replace invalid UTF-8
fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"hello\n"), "hello");
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{FFFD} byte");
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_stream() {
        let input: &[u8] = b"first\nbad \xff byte\nafter\n";
        let (tx, mut rx) = mpsc::unbounded_channel();

        spawn_line_stream(input, Some(1), OutputStream::Stdout, Some(tx), CancellationToken::new())
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line.line);
        }
        assert_eq!(lines, vec!["first", "bad \u{FFFD} byte", "after"]);
    }
}
