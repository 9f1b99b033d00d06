//! Text frame codec.
//!
//! One frame carries one acquisition batch: every value printed as
//! `%+.15e`, values joined by `,`, the whole frame terminated by `\n`.
//!
//! The counter itself answers `R?` with an IEEE-488.2 definite-length block
//! (`#<d><len><payload>`); an empty buffer comes back as `#10`. Both the
//! producer and the consumer treat that reply (or an empty payload) as "no
//! samples this cycle".

use crate::error::{AppResult, DaqError};

/// The counter's empty-buffer reply.
pub const NO_DATA: &str = "#10";

/// Digits after the decimal point on the wire.
pub const WIRE_PRECISION: usize = 15;

/// Encode samples as one `%+.15e` comma-joined, newline-terminated line.
pub fn encode_values(values: &[f64]) -> String {
    let mut out = values
        .iter()
        .map(|v| format_scientific(*v, WIRE_PRECISION, true))
        .collect::<Vec<_>>()
        .join(",");
    out.push('\n');
    out
}

/// Decode a comma-joined line of decimal numbers.
pub fn decode_values(text: &str) -> AppResult<Vec<f64>> {
    let body = strip_block_header(text).trim();
    if body.is_empty() {
        return Err(DaqError::Frame("empty frame".to_string()));
    }
    body.split(',')
        .map(|field| {
            let field = field.trim();
            match field.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(DaqError::Frame(format!("not a finite number: '{field}'"))),
            }
        })
        .collect()
}

/// Whether a payload is the counter's "no data" reply or carries nothing.
pub fn is_no_data(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed == NO_DATA || strip_block_header(trimmed).trim().is_empty()
}

/// Remove a leading IEEE-488.2 definite-length block header (`#<d><len>`).
///
/// Input without a well-formed header is returned unchanged.
pub fn strip_block_header(text: &str) -> &str {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix('#') else {
        return text;
    };
    let Some(digits) = rest.chars().next().and_then(|c| c.to_digit(10)) else {
        return text;
    };
    let digits = digits as usize;
    // "#0" is the indefinite-length form: no length field follows.
    if digits == 0 {
        return &rest[1..];
    }
    let len_field = rest.get(1..1 + digits);
    match len_field {
        Some(field) if field.bytes().all(|b| b.is_ascii_digit()) => &rest[1 + digits..],
        _ => text,
    }
}

/// Format like C's `%.{precision}e` (or `%+.{precision}e` with `force_sign`).
///
/// Rust's `{:e}` prints `1.5e3`; C prints `1.5e+03`. The exponent here always
/// carries a sign and at least two digits.
pub fn format_scientific(value: f64, precision: usize, force_sign: bool) -> String {
    let sign = if value.is_sign_negative() && !value.is_nan() {
        "-"
    } else if force_sign {
        "+"
    } else {
        ""
    };
    if value.is_nan() {
        return format!("{sign}nan");
    }
    if value.is_infinite() {
        return format!("{sign}inf");
    }

    let raw = format!("{:.*e}", precision, value.abs());
    let (mantissa, exponent) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let exp_sign = if exponent < 0 { '-' } else { '+' };
    format!("{sign}{mantissa}e{exp_sign}{:02}", exponent.unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_printf() {
        assert_eq!(
            format_scientific(79.86e6, 15, true),
            "+7.986000000000000e+07"
        );
        assert_eq!(format_scientific(-1.25e-5, 3, true), "-1.250e-05");
        assert_eq!(format_scientific(0.0, 2, true), "+0.00e+00");
        assert_eq!(format_scientific(1e100, 1, false), "1.0e+100");
        assert_eq!(format_scientific(3.0, 18, false), "3.000000000000000000e+00");
    }

    #[test]
    fn encodes_batch_as_one_line() {
        assert_eq!(
            encode_values(&[79_860_000.5, -1.0]),
            "+7.986000050000000e+07,-1.000000000000000e+00\n"
        );
    }

    #[test]
    fn decode_accepts_producer_output() {
        let values = vec![79_859_912.25, 79_860_101.0, 79_860_000.0];
        let decoded = decode_values(&encode_values(&values)).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn decode_accepts_plain_instrument_reply() {
        let decoded = decode_values("+7.98600012E+07,+7.98599988E+07\n").unwrap();
        assert_eq!(decoded, vec![79_860_012.0, 79_859_988.0]);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_values("1.0,abc"), Err(DaqError::Frame(_))));
        assert!(matches!(decode_values("1.0,,2.0"), Err(DaqError::Frame(_))));
        assert!(matches!(decode_values("nan"), Err(DaqError::Frame(_))));
        assert!(matches!(decode_values(""), Err(DaqError::Frame(_))));
    }

    #[test]
    fn recognises_no_data_reply() {
        assert!(is_no_data("#10"));
        assert!(is_no_data("#10\n"));
        assert!(is_no_data(""));
        assert!(is_no_data("  \n"));
        assert!(!is_no_data("+1.0e+00\n"));
    }

    #[test]
    fn strips_definite_length_header() {
        assert_eq!(strip_block_header("#216+1.00000000E+07"), "+1.00000000E+07");
        assert_eq!(strip_block_header("#10"), "");
        assert_eq!(strip_block_header("+1.0"), "+1.0");
        // malformed header left alone
        assert_eq!(strip_block_header("#x12"), "#x12");
        assert_eq!(strip_block_header("#3ab"), "#3ab");
    }
}
