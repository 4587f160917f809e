//! Human-readable byte, rate and ETA strings for the progress display.

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with the largest base-1024 unit whose scaled value is
/// at least 1, rounded to the nearest integer.
///
/// `0` is always `"0 B"`. Values beyond the terabyte range stay in TB.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut exponent = 0u32;
    while (exponent as usize) < UNITS.len() - 1 && bytes >= 1024u64.pow(exponent + 1) {
        exponent += 1;
    }
    let scaled = bytes as f64 / 1024u64.pow(exponent) as f64;
    format!("{} {}", scaled.round() as u64, UNITS[exponent as usize])
}

/// Format a transfer rate in bytes per second, e.g. `"3 MB/s"`.
///
/// Negative or non-finite rates are rendered as `"0 B/s"`.
pub fn format_rate(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return "0 B/s".to_string();
    }
    format!("{}/s", format_bytes(bytes_per_sec.round() as u64))
}

/// Format a remaining-time estimate in seconds.
///
/// `None` (unknown total or stalled transfer) renders as `"--"`.
pub fn format_eta(seconds: Option<f64>) -> String {
    let secs = match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => s.round() as u64,
        _ => return "--".to_string(),
    };

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}
