pub static CONTENT_LENGTH: &str = "Content-Length";

pub static CRLF: &str = "\r\n";

/// True when a raw header line sets Content-Length, whatever its casing.
pub fn is_content_length(line: &str) -> bool {
    let Some((name, _)) = line.split_once(':') else {
        return false;
    };

    name.eq_ignore_ascii_case(CONTENT_LENGTH)
}

pub fn content_length_line(body_len: usize) -> String {
    format!("{CONTENT_LENGTH}: {body_len}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_content_length_in_any_case() {
        assert!(is_content_length("Content-Length: 4"));
        assert!(is_content_length("content-length:4"));
        assert!(is_content_length("CONTENT-LENGTH: 0"));
    }

    #[test]
    fn ignores_other_lines() {
        assert!(!is_content_length("GET / HTTP/1.1"));
        assert!(!is_content_length("Content-Type: text/plain"));
        assert!(!is_content_length("X-Content-Length: 3"));
        assert!(!is_content_length("Content-Length 3"));
    }
}
