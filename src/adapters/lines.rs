//! Line-delimited notification source.
//!
//! Each non-empty line is one notification. A line may carry the store path
//! in front of the package, separated by a tab:
//!
//! ```text
//! ambulances/AMB-417/encrypted_vitals\t{"ciphertext": "...", "nonce": "...", "auth_tag": "..."}
//! ```
//!
//! Lines without a tab are attributed to the default path.

use std::io::BufRead;

use crate::ports::{Notification, NotificationSource};

/// Store path used by single-stream producers.
pub const DEFAULT_PATH: &str = "encrypted_vitals";

/// Error type for line source reads.
#[derive(Debug, thiserror::Error)]
pub enum LineSourceError {
    #[error("Read failed at line {line}: {source}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Notification source over a buffered reader.
pub struct LineSource<R> {
    reader: R,
    default_path: String,
    line_no: usize,
    failed: bool,
}

impl<R: BufRead + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_default_path(reader, DEFAULT_PATH)
    }

    pub fn with_default_path(reader: R, default_path: impl Into<String>) -> Self {
        Self {
            reader,
            default_path: default_path.into(),
            line_no: 0,
            failed: false,
        }
    }

    fn parse_line(&self, line: &str) -> Notification {
        match line.split_once('\t') {
            Some((path, payload)) if !path.trim().is_empty() => {
                Notification::new(path.trim(), payload.trim())
            }
            _ => Notification::new(self.default_path.clone(), line.trim()),
        }
    }
}

impl<R: BufRead + Send> NotificationSource for LineSource<R> {
    type Error = LineSourceError;

    fn next_notification(&mut self) -> Option<Result<Notification, Self::Error>> {
        // A reader that failed once is treated as closed on the next pull.
        if self.failed {
            return None;
        }

        let mut buf = String::new();
        loop {
            buf.clear();
            self.line_no += 1;
            match self.reader.read_line(&mut buf) {
                Ok(0) => return None,
                Ok(_) if buf.trim().is_empty() => continue,
                Ok(_) => return Some(Ok(self.parse_line(&buf))),
                Err(source) => {
                    self.failed = true;
                    return Some(Err(LineSourceError::Io {
                        line: self.line_no,
                        source,
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn drain<R: BufRead + Send>(mut source: LineSource<R>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Some(item) = source.next_notification() {
            out.push(item.expect("Should read"));
        }
        out
    }

    #[test]
    fn test_one_notification_per_line() {
        let input = "{\"a\":1}\n\n  \n{\"b\":2}\n";
        let items = drain(LineSource::new(Cursor::new(input)));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Notification::new(DEFAULT_PATH, "{\"a\":1}"));
        assert_eq!(items[1].payload, "{\"b\":2}");
    }

    #[test]
    fn test_path_prefix() {
        let input = "ambulances/AMB-1/encrypted_vitals\t{\"a\":1}\r\n";
        let items = drain(LineSource::new(Cursor::new(input)));
        assert_eq!(items[0].path, "ambulances/AMB-1/encrypted_vitals");
        assert_eq!(items[0].payload, "{\"a\":1}");
    }

    #[test]
    fn test_last_line_without_newline() {
        let items = drain(LineSource::new(Cursor::new("{\"a\":1}")));
        assert_eq!(items.len(), 1);
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "gone"))
        }
    }

    #[test]
    fn test_read_error_then_closed() {
        let mut source = LineSource::new(std::io::BufReader::new(Broken));
        assert!(matches!(
            source.next_notification(),
            Some(Err(LineSourceError::Io { line: 1, .. }))
        ));
        assert!(source.next_notification().is_none());
    }
}
