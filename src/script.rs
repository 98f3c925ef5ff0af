use crate::duration::parse_duration;
use crate::error::ScriptError;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderEntry {
    /// Sent verbatim, followed by CRLF.
    Line(String),
    /// Takes the place of a line: wait this long before continuing.
    Pause(Duration),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestScript {
    pub host: String,
    pub header_lines: Vec<HeaderEntry>,
    pub body: String,
    pub per_byte_body_delay: Duration,
    /// Best effort only: transport buffering reads ahead of the pacing point.
    pub per_byte_read_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Host,
    Headers,
    ByteSleeps,
    Body,
}

impl Section {
    fn next(self) -> Self {
        match self {
            Section::Host => Section::Headers,
            Section::Headers => Section::ByteSleeps,
            Section::ByteSleeps | Section::Body => Section::Body,
        }
    }
}

struct Patterns {
    sleep: Regex,
    per_byte_body: Regex,
    per_byte_read: Regex,
}

impl Patterns {
    fn new() -> Self {
        Patterns {
            sleep: Regex::new(r"^sleep (\S+)").expect("sleep pattern is valid"),
            per_byte_body: Regex::new(r"^PerByteBodySleep:\s*(\S+)")
                .expect("body sleep pattern is valid"),
            per_byte_read: Regex::new(r"^PerByteResponseReadSleep:\s*(\S+)")
                .expect("read sleep pattern is valid"),
        }
    }
}

fn directive_duration(
    directive: &'static str,
    line: &str,
    value: &str,
) -> Result<Duration, ScriptError> {
    parse_duration(value).map_err(|reason| ScriptError::BadDuration {
        directive,
        line: line.to_string(),
        reason,
    })
}

pub fn load(path: impl AsRef<Path>) -> Result<TestScript, ScriptError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ScriptError::Open {
        path: path.display().to_string(),
        source,
    })?;

    parse(&text)
}

pub fn parse(text: &str) -> Result<TestScript, ScriptError> {
    let patterns = Patterns::new();
    let mut script = TestScript::default();
    let mut body_lines: Vec<&str> = vec![];
    let mut section = Section::Host;

    for line in text.lines() {
        // tolerate scripts saved with CRLF line endings
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            section = section.next();
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        match section {
            Section::Host => script.host = line.to_string(),
            Section::Headers => {
                let entry = match patterns.sleep.captures(line) {
                    Some(captures) => {
                        HeaderEntry::Pause(directive_duration("header sleep", line, &captures[1])?)
                    }
                    None => HeaderEntry::Line(line.to_string()),
                };
                script.header_lines.push(entry);
            }
            Section::ByteSleeps => {
                if let Some(captures) = patterns.per_byte_body.captures(line) {
                    script.per_byte_body_delay =
                        directive_duration("PerByteBodySleep", line, &captures[1])?;
                } else if let Some(captures) = patterns.per_byte_read.captures(line) {
                    script.per_byte_read_delay =
                        directive_duration("PerByteResponseReadSleep", line, &captures[1])?;
                } else {
                    return Err(ScriptError::UnknownByteSleep(line.to_string()));
                }
            }
            Section::Body => body_lines.push(line),
        }
    }

    if script.host.is_empty() {
        return Err(ScriptError::MissingHost);
    }

    script.body = body_lines.join("\n");

    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    static FULL_SCRIPT: &str = "\
# target
localhost:8585

POST /upload HTTP/1.1
Host: localhost:8585
sleep 1.5s
# comment between headers
X-Late: yes

PerByteBodySleep: 100ms
PerByteResponseReadSleep:2s

first line
# not part of the body

second line
";

    #[test]
    fn parses_all_sections() {
        let script = parse(FULL_SCRIPT).unwrap();

        assert_eq!(script.host, "localhost:8585");
        assert_eq!(
            script.header_lines,
            vec![
                HeaderEntry::Line("POST /upload HTTP/1.1".to_string()),
                HeaderEntry::Line("Host: localhost:8585".to_string()),
                HeaderEntry::Pause(Duration::from_millis(1500)),
                HeaderEntry::Line("X-Late: yes".to_string()),
            ]
        );
        assert_eq!(script.per_byte_body_delay, Duration::from_millis(100));
        assert_eq!(script.per_byte_read_delay, Duration::from_secs(2));
        assert_eq!(script.body, "first line\nsecond line");
    }

    #[test]
    fn minimal_script_has_no_body_or_delays() {
        let script = parse("localhost:8585\n\nGET / HTTP/1.1\nHost: localhost:8585\n").unwrap();

        assert_eq!(script.header_lines.len(), 2);
        assert!(script.body.is_empty());
        assert_eq!(script.per_byte_body_delay, Duration::ZERO);
        assert_eq!(script.per_byte_read_delay, Duration::ZERO);
    }

    #[test]
    fn crlf_scripts_are_accepted() {
        let script = parse("example.com:443\r\n\r\nGET / HTTP/1.1\r\n").unwrap();

        assert_eq!(script.host, "example.com:443");
        assert_eq!(
            script.header_lines,
            vec![HeaderEntry::Line("GET / HTTP/1.1".to_string())]
        );
    }

    #[test]
    fn malformed_header_sleep_is_fatal() {
        let err = parse("localhost:8585\n\nGET / HTTP/1.1\nsleep abc\n").unwrap_err();

        assert!(matches!(err, ScriptError::BadDuration { ref line, .. } if line == "sleep abc"));
    }

    #[test]
    fn malformed_byte_sleep_is_fatal() {
        let err = parse("localhost:8585\n\nGET / HTTP/1.1\n\nPerByteBodySleep: soon\n").unwrap_err();

        assert!(matches!(
            err,
            ScriptError::BadDuration {
                directive: "PerByteBodySleep",
                ..
            }
        ));
    }

    #[test]
    fn unknown_byte_sleep_is_fatal() {
        let err = parse("localhost:8585\n\nGET / HTTP/1.1\n\nPerByteNapTime: 1s\n").unwrap_err();

        assert!(matches!(err, ScriptError::UnknownByteSleep(line) if line == "PerByteNapTime: 1s"));
    }

    #[test]
    fn missing_host_is_fatal() {
        assert!(matches!(parse("# nothing\n"), Err(ScriptError::MissingHost)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load("/definitely/not/here.txt").unwrap_err();

        assert!(matches!(err, ScriptError::Open { .. }));
    }
}
