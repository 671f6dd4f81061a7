use chrono::{Duration, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%b-%Y", "%d %b %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

// Serial day numbers Excel accepts, 1900-01-01 through 9999-12-31.
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

pub fn trim_cell(text: &str) -> &str {
    text.trim().trim_start_matches('\u{feff}').trim()
}

/// Header comparison key: trimmed, BOM-free, lowercase, single-spaced.
pub fn normalize_key(key: &str) -> String {
    trim_cell(key)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lenient numeric parse for vendor text cells such as `"12.5%"`, `"@1,200"` or `"(3.1)"`.
///
/// Parentheses around the whole value mark a negative. Everything except digits,
/// `.`, `-` and an exponent (`1e-3`) is dropped before parsing.
pub fn parse_float(raw: &str) -> Option<f64> {
    let text = trim_cell(raw);
    let (text, negate) = match text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (inner, true),
        None => (text, false),
    };
    let chars: Vec<char> = text.chars().collect();
    let cleaned: String = chars
        .iter()
        .enumerate()
        .filter(|(i, c)| match c {
            '0'..='9' | '.' | '-' => true,
            'e' | 'E' => is_exponent_marker(&chars, *i),
            '+' => *i > 0 && matches!(chars[*i - 1], 'e' | 'E') && is_exponent_marker(&chars, *i - 1),
            _ => false,
        })
        .map(|(_, c)| *c)
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let value = cleaned.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(if negate { -value } else { value })
}

/// An `e`/`E` sitting between a digit and an optionally signed digit.
fn is_exponent_marker(chars: &[char], i: usize) -> bool {
    let after_digit = i > 0 && chars[i - 1].is_ascii_digit();
    let next = match chars.get(i + 1) {
        Some('+' | '-') => chars.get(i + 2),
        other => other,
    };
    after_digit && matches!(next, Some(c) if c.is_ascii_digit())
}

pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_EXCEL_SERIAL {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = trim_cell(raw);
    if text.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(text, format) {
            return Some(stamp.date());
        }
    }
    text.parse::<f64>().ok().and_then(excel_serial_to_date)
}
