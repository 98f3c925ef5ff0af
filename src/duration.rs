use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

struct Terms {
    whole: Regex,
    term: Regex,
}

fn terms() -> &'static Terms {
    static TERMS: OnceLock<Terms> = OnceLock::new();
    TERMS.get_or_init(|| Terms {
        whole: Regex::new(r"^(?:\s*\d*\.?\d+\s*[a-zA-Zµ]+)+$")
            .expect("duration pattern is valid"),
        term: Regex::new(r"(\d*\.?\d+)\s*([a-zA-Zµ]+)").expect("duration term pattern is valid"),
    })
}

/// Sums `<number><unit>` terms where any number may carry a fraction,
/// e.g. `1h30.5m` or `1.5h 30m`. Units are whatever humantime accepts.
fn parse_fractional(s: &str) -> Option<Duration> {
    let terms = terms();
    if !terms.whole.is_match(s) {
        return None;
    }

    let mut total = Duration::ZERO;
    for captures in terms.term.captures_iter(s) {
        let value: f64 = captures[1].parse().ok()?;
        let unit = humantime::parse_duration(&format!("1{}", &captures[2])).ok()?;
        total = total.checked_add(unit.mul_f64(value))?;
    }

    Some(total)
}

/// Parses a human-readable, unit-suffixed duration such as `100ms`, `2s`,
/// `1m 30s`, `1.5s` or `1h30.5m`. A bare `0` means no delay.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    match humantime::parse_duration(s) {
        Ok(duration) => Ok(duration),
        Err(err) => parse_fractional(s).ok_or_else(|| err.to_string()),
    }
}

pub fn format_duration(duration: Duration) -> String {
    // whole microseconds keep the transcript readable
    let micros = Duration::from_micros(duration.as_micros() as u64);
    if micros.is_zero() {
        return "0s".to_string();
    }

    humantime::format_duration(micros).to_string()
}
