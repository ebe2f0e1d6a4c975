use regex::Regex;

use super::graph::TIMESTAMP_GRAPH;
use super::tokenizer::tokenize;
use crate::error::LappError;

/// Configuration for the multiline entry boundary detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Maximum number of bytes scanned for timestamp detection at the
    /// beginning of each line.
    pub max_scan_bytes: usize,
    /// Minimum probability for a line to be considered a new log entry.
    pub threshold: f64,
    /// Optional regex that overrides timestamp detection: lines matching it
    /// are treated as new entries.
    pub first_line_regex: Option<String>,
    /// Maximum size of a merged log entry in bytes. Entries exceeding this
    /// are flushed regardless of detection.
    pub max_entry_bytes: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_scan_bytes: 60,
            threshold: 0.5,
            first_line_regex: None,
            max_entry_bytes: 65536,
        }
    }
}

/// Determines whether a log line is the start of a new log entry.
#[derive(Debug, Clone)]
pub struct Detector {
    threshold: f64,
    first_line_regex: Option<Regex>,
    max_scan_bytes: usize,
    max_entry_bytes: usize,
}

impl Detector {
    /// Build a detector from config. An invalid first-line regex fails here,
    /// not at first use.
    pub fn new(config: DetectorConfig) -> Result<Self, LappError> {
        let first_line_regex = match &config.first_line_regex {
            Some(pattern) => Some(Regex::new(pattern)?),
            None => None,
        };

        Ok(Self {
            threshold: config.threshold,
            first_line_regex,
            max_scan_bytes: config.max_scan_bytes,
            max_entry_bytes: config.max_entry_bytes,
        })
    }

    /// True if the line looks like the start of a new log entry, i.e. it
    /// begins with a timestamp or matches the first-line regex.
    pub fn is_new_entry(&self, line: &str) -> bool {
        if let Some(re) = &self.first_line_regex {
            return re.is_match(line);
        }

        let bytes = line.as_bytes();
        let scan_len = bytes.len().min(self.max_scan_bytes);
        if scan_len == 0 {
            return false;
        }

        let tokens = tokenize(&bytes[..scan_len]);
        TIMESTAMP_GRAPH.match_probability(&tokens).probability > self.threshold
    }

    /// Configured maximum merged entry size.
    pub fn max_entry_bytes(&self) -> usize {
        self.max_entry_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamped_lines_start_new_entries() {
        let d = Detector::new(DetectorConfig::default()).unwrap();

        let timestamped = [
            "2024-03-28 13:45:30 INFO Application started",
            "2024-03-28T13:45:30.123456Z INFO Starting",
            "Mar 16 08:12:04 myhost sshd[1234]: Accepted",
            "28/Mar/2024:13:45:30 +0000 GET /api/health",
            "2024/04/25 14:57:42 [error] worker exited",
        ];
        for line in timestamped {
            assert!(d.is_new_entry(line), "expected is_new_entry=true for {line:?}");
        }
    }

    #[test]
    fn continuation_lines_do_not_start_entries() {
        let d = Detector::new(DetectorConfig::default()).unwrap();

        let continuations = [
            "\tat com.example.Foo.bar(Foo.java:42)",
            "\tat sun.reflect.NativeMethodAccessorImpl.invoke(NativeMethodAccessorImpl.java:62)",
            "Caused by: java.lang.NullPointerException",
            "  File \"/app/worker.py\", line 45, in process_task",
            "    result = compute(data)",
            "ZeroDivisionError: division by zero",
            "goroutine 42 [running]:",
            "main.handleUsers(0xc000120000)",
            "\t/app/handlers.go:78 +0x1a4",
            "java.lang.NullPointerException: Cannot invoke method",
            "\t... 2 more",
        ];
        for line in continuations {
            assert!(!d.is_new_entry(line), "expected is_new_entry=false for {line:?}");
        }
    }

    #[test]
    fn empty_line_is_never_a_new_entry() {
        let d = Detector::new(DetectorConfig::default()).unwrap();
        assert!(!d.is_new_entry(""));
    }

    #[test]
    fn first_line_regex_overrides_detection() {
        let d = Detector::new(DetectorConfig {
            first_line_regex: Some(r"^\d{4}-\d{2}-\d{2}".to_string()),
            ..DetectorConfig::default()
        })
        .unwrap();

        assert!(d.is_new_entry("2024-03-28 something"));
        assert!(!d.is_new_entry("\tat com.example.Foo.bar(Foo.java:42)"));
    }

    #[test]
    fn invalid_regex_fails_at_construction() {
        let res = Detector::new(DetectorConfig {
            first_line_regex: Some("[invalid".to_string()),
            ..DetectorConfig::default()
        });
        assert!(matches!(res, Err(LappError::DetectorConfig(_))));
    }
}
