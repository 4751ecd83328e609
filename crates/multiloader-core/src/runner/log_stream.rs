//! Capture and classification of the engine's output streams.
//!
//! Every line is appended verbatim to the experiment's `loader.log`. The
//! engine emits logfmt-style lines (`level=info msg="..."`); stdout lines are
//! re-logged at debug/trace when tagged so, and otherwise only the two
//! invocation-count summaries are surfaced at info. Stderr lines are always
//! re-logged at error.

use std::io;
use std::sync::Arc;

use regex::Regex;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace};

/// Log file shared by both reader tasks and the retry loop.
pub type SharedLog = Arc<Mutex<File>>;

const SUMMARY_MARKERS: [&str; 2] = [
    "Number of successful invocations:",
    "Number of failed invocations:",
];

/// Which engine stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// How a captured line is surfaced through the orchestrator's own logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relay {
    Debug(String),
    Trace(String),
    Info(String),
    Error(String),
    /// Written to the log file only.
    Suppress,
}

impl Relay {
    fn emit(self) {
        match self {
            Relay::Debug(msg) => debug!(target: "loader", "{}", msg),
            Relay::Trace(msg) => trace!(target: "loader", "{}", msg),
            Relay::Info(msg) => info!(target: "loader", "{}", msg),
            Relay::Error(msg) => error!(target: "loader", "{}", msg),
            Relay::Suppress => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogClassifier {
    level: Regex,
    message: Regex,
}

impl LogClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            level: Regex::new(r"level=([A-Za-z]+)")?,
            message: Regex::new(r#"msg="((?:[^"\\]|\\.)*)""#)?,
        })
    }

    /// Severity token of a line, lowercased. Empty when absent.
    pub fn level(&self, line: &str) -> String {
        self.level
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Message token of a line, or the whole line when it has none.
    pub fn message<'a>(&self, line: &'a str) -> &'a str {
        self.message
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(line)
    }

    pub fn classify(&self, stream: StreamKind, line: &str) -> Relay {
        if line.is_empty() {
            return Relay::Suppress;
        }
        if stream == StreamKind::Stderr {
            return Relay::Error(line.to_string());
        }

        let message = self.message(line);
        match self.level(line).as_str() {
            "debug" => Relay::Debug(message.to_string()),
            "trace" => Relay::Trace(message.to_string()),
            _ if SUMMARY_MARKERS.iter().any(|m| message.contains(m)) => {
                Relay::Info(message.replace("\\t", " "))
            }
            _ => Relay::Suppress,
        }
    }
}

/// Drain `reader` line by line into `log`, relaying each line.
///
/// Lines are copied to the log as raw bytes; bytes that are not valid UTF-8
/// are replaced only in the relayed message. Returns once the stream reaches
/// end of file.
pub async fn pump<R>(
    reader: R,
    stream: StreamKind,
    classifier: Arc<LogClassifier>,
    log: SharedLog,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = trim_line_ending(&buf);
        {
            let mut file = log.lock().await;
            file.write_all(line).await?;
            file.write_all(b"\n").await?;
        }
        classifier
            .classify(stream, &String::from_utf8_lossy(line))
            .emit();
    }
    log.lock().await.flush().await
}

fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Append a line written by the orchestrator itself.
pub async fn append_line(log: &SharedLog, line: &str) -> io::Result<()> {
    let mut file = log.lock().await;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> LogClassifier {
        LogClassifier::new().unwrap()
    }

    #[test]
    fn test_parse_level_and_message() {
        let c = classifier();
        let line = r#"time="2024-01-02T15:04:05Z" level=debug msg="Invocation \"f1\" done""#;
        assert_eq!(c.level(line), "debug");
        assert_eq!(c.message(line), r#"Invocation \"f1\" done"#);
        assert_eq!(c.level("plain output"), "");
        assert_eq!(c.message("plain output"), "plain output");
    }

    #[test]
    fn test_debug_and_trace_relayed_at_their_level() {
        let c = classifier();
        assert_eq!(
            c.classify(StreamKind::Stdout, r#"level=debug msg="warming up""#),
            Relay::Debug("warming up".to_string())
        );
        assert_eq!(
            c.classify(StreamKind::Stdout, r#"level=trace msg="tick""#),
            Relay::Trace("tick".to_string())
        );
    }

    #[test]
    fn test_info_lines_filtered_to_summaries() {
        let c = classifier();
        assert_eq!(
            c.classify(StreamKind::Stdout, r#"level=info msg="Invocation 17 dispatched""#),
            Relay::Suppress
        );
        assert_eq!(
            c.classify(
                StreamKind::Stdout,
                r#"level=info msg="Number of successful invocations: \t42""#
            ),
            Relay::Info("Number of successful invocations:  42".to_string())
        );
        assert!(matches!(
            c.classify(StreamKind::Stdout, "Number of failed invocations: 0"),
            Relay::Info(_)
        ));
    }

    #[test]
    fn test_stderr_always_error() {
        let c = classifier();
        assert_eq!(
            c.classify(StreamKind::Stderr, r#"level=debug msg="x""#),
            Relay::Error(r#"level=debug msg="x""#.to_string())
        );
        assert_eq!(c.classify(StreamKind::Stderr, ""), Relay::Suppress);
    }

    #[tokio::test]
    async fn test_pump_writes_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.log");
        let log: SharedLog = Arc::new(Mutex::new(File::create(&path).await.unwrap()));

        let input: &[u8] = b"level=info msg=\"a\"\n\nlast line without newline";
        pump(input, StreamKind::Stdout, Arc::new(classifier()), log.clone())
            .await
            .unwrap();
        append_line(&log, "divider").await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "level=info msg=\"a\"\n\nlast line without newline\ndivider\n"
        );
    }

    #[tokio::test]
    async fn test_pump_keeps_non_utf8_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.log");
        let log: SharedLog = Arc::new(Mutex::new(File::create(&path).await.unwrap()));

        let input: &[u8] =
            b"fn=caf\xe9\r\nlevel=info msg=\"Number of successful invocations: 5\"\n";
        pump(input, StreamKind::Stdout, Arc::new(classifier()), log.clone())
            .await
            .unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(
            written,
            b"fn=caf\xe9\nlevel=info msg=\"Number of successful invocations: 5\"\n".to_vec()
        );
    }

    #[test]
    fn test_lossy_line_still_classified() {
        let c = classifier();
        let line = String::from_utf8_lossy(b"level=debug msg=\"caf\xe9\"");
        assert_eq!(
            c.classify(StreamKind::Stdout, &line),
            Relay::Debug("caf\u{FFFD}".to_string())
        );
    }
}
