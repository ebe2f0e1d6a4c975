//! Log source reader.
//!
//! Reads a log file line by line on a dedicated task and delivers each line
//! (or a single terminal read error) through a bounded channel, so the
//! consumer gets backpressure instead of an unbounded buffer.

use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::LappError;

/// Channel capacity between the reader task and its consumer.
pub const CHANNEL_CAPACITY: usize = 100;

/// Maximum length of a single physical line, excluding the terminator.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// A single raw log line read from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// 1-based physical line number, monotonically increasing.
    pub line_number: u64,
    /// Line content with the LF / CRLF terminator stripped.
    pub content: String,
}

/// Result of one read step: a line, or the terminal error of the stream.
pub type ReadResult = Result<LogLine, LappError>;

/// Open `path` and spawn a reader task streaming its lines.
///
/// Lines are split on LF; a trailing CR is stripped so CRLF input parses
/// cleanly. Bytes are treated as opaque: invalid UTF-8 is replaced rather
/// than rejected. An I/O error is sent as the final element, after which the
/// channel closes. Cancelling the token stops the reader promptly.
pub async fn read_lines(
    path: impl AsRef<Path>,
    cancel: CancellationToken,
) -> Result<mpsc::Receiver<ReadResult>, LappError> {
    let file = File::open(path.as_ref()).await?;
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut reader = BufReader::new(file);
        let mut buf: Vec<u8> = Vec::with_capacity(4096);
        let mut line_number: u64 = 0;

        loop {
            buf.clear();
            // Bound each read so a terminator-less line cannot grow the
            // buffer past the line cap.
            let mut limited = (&mut reader).take((MAX_LINE_BYTES + 2) as u64);
            let n = tokio::select! {
                res = limited.read_until(b'\n', &mut buf) => match res {
                    Ok(n) => n,
                    Err(e) => {
                        let _ = tx.send(Err(LappError::Source(e))).await;
                        return;
                    }
                },
                () = cancel.cancelled() => return,
            };
            if n == 0 {
                return; // EOF; dropping tx closes the channel
            }

            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            if buf.len() > MAX_LINE_BYTES {
                let err = io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {} exceeds {MAX_LINE_BYTES} bytes", line_number + 1),
                );
                let _ = tx.send(Err(LappError::Source(err))).await;
                return;
            }

            line_number += 1;
            let line = LogLine {
                line_number,
                content: String::from_utf8_lossy(&buf).into_owned(),
            };
            tokio::select! {
                res = tx.send(Ok(line)) => {
                    if res.is_err() {
                        return; // consumer went away
                    }
                }
                () = cancel.cancelled() => return,
            }
        }
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn collect(mut rx: mpsc::Receiver<ReadResult>) -> Vec<ReadResult> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn reads_lines_with_monotonic_numbers() {
        let lines = [
            "2024-01-01 INFO Starting service",
            "2024-01-01 WARN Disk space low",
            "2024-01-01 ERROR Connection refused",
        ];
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for l in &lines {
            writeln!(f, "{l}").unwrap();
        }

        let rx = read_lines(f.path(), CancellationToken::new())
            .await
            .unwrap();
        let got = collect(rx).await;

        assert_eq!(got.len(), lines.len());
        for (i, item) in got.iter().enumerate() {
            let line = item.as_ref().expect("no read error expected");
            assert_eq!(line.line_number, (i + 1) as u64);
            assert_eq!(line.content, lines[i]);
        }
    }

    #[tokio::test]
    async fn strips_crlf_terminators() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"first\r\nsecond\n").unwrap();

        let rx = read_lines(f.path(), CancellationToken::new())
            .await
            .unwrap();
        let got = collect(rx).await;

        assert_eq!(got.len(), 2);
        assert_eq!(got[0].as_ref().unwrap().content, "first");
        assert_eq!(got[1].as_ref().unwrap().content, "second");
    }

    #[tokio::test]
    async fn missing_file_fails_at_open() {
        let res = read_lines("/nonexistent/path/to/file.log", CancellationToken::new()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn oversized_line_is_terminal_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "ok").unwrap();
        f.write_all(&vec![b'x'; MAX_LINE_BYTES + 10]).unwrap();
        f.write_all(b"\n").unwrap();

        let rx = read_lines(f.path(), CancellationToken::new())
            .await
            .unwrap();
        let got = collect(rx).await;

        assert_eq!(got.len(), 2);
        assert!(got[0].is_ok());
        assert!(matches!(got[1], Err(LappError::Source(_))));
    }

    #[tokio::test]
    async fn cancellation_stops_the_stream() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..10_000 {
            writeln!(f, "line {i}").unwrap();
        }

        let cancel = CancellationToken::new();
        let mut rx = read_lines(f.path(), cancel.clone()).await.unwrap();

        // Take one line, then cancel; the stream must end without draining
        // the whole file.
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.line_number, 1);
        cancel.cancel();

        let mut remaining = 0usize;
        while rx.recv().await.is_some() {
            remaining += 1;
        }
        assert!(remaining < 10_000);
    }
}
