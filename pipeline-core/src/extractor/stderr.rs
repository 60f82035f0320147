//! Parses the extractor's stderr progress line to recover a total byte count.

use regex::Regex;
use std::sync::OnceLock;

/// `[download]  12.3% of ~45.67MiB at 1.2MiB/s ETA 00:10` — only the
/// percentage and the "of" size are load-bearing; the rest is cosmetic.
fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[download\]\s+([\d.]+)%\s+of\s+~?([\d.]+)\s*(KiB|MiB|GiB|B)").unwrap()
    })
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit.to_ascii_uppercase().as_str() {
        "GIB" => 1024.0 * 1024.0 * 1024.0,
        "MIB" => 1024.0 * 1024.0,
        "KIB" => 1024.0,
        _ => 1.0,
    }
}

/// Returns the total size in bytes if `line` is a recognized download
/// progress line, else `None`.
pub fn parse_total_bytes(line: &str) -> Option<u64> {
    let caps = progress_re().captures(line)?;
    let size: f64 = caps.get(2)?.as_str().parse().ok()?;
    let unit = caps.get(3)?.as_str();
    Some((size * unit_multiplier(unit)).round() as u64)
}

/// A handful of known-benign stderr lines that should not be logged as
/// warnings even though they are not progress lines.
pub fn is_progress_line(line: &str) -> bool {
    progress_re().is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mib() {
        let line = "[download]  42.0% of ~10.50MiB at 1.20MiB/s ETA 00:05";
        assert_eq!(parse_total_bytes(line), Some((10.50 * 1024.0 * 1024.0).round() as u64));
    }

    #[test]
    fn parses_gib_case_insensitive() {
        let line = "[DOWNLOAD] 5.0% of 2.00gib at 500.00KiB/s ETA 01:00:00";
        assert_eq!(parse_total_bytes(line), Some((2.0 * 1024.0 * 1024.0 * 1024.0).round() as u64));
    }

    #[test]
    fn non_progress_line_returns_none() {
        assert_eq!(parse_total_bytes("[download] Destination: video.mp4"), None);
        assert_eq!(parse_total_bytes("WARNING: some cookie notice"), None);
    }

    #[test]
    fn exact_match_without_approx_prefix() {
        let line = "[download]  99.9% of 1.00KiB at 1.00KiB/s ETA 00:00";
        assert_eq!(parse_total_bytes(line), Some(1024));
    }
}
