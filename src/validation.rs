//! Validation helpers for user-supplied settings.
//!
//! Each helper returns a static message on failure; callers wrap it into
//! [`DaqError::Validation`](crate::error::DaqError::Validation) together with the
//! name of the offending field.

use std::ops::RangeInclusive;

/// Validates if a given u16 value is a valid port number.
/// By type, the port is already within the 0-65535 range.
/// This function checks that the port is not 0, which is reserved.
///
/// # Arguments
///
/// * `port` - The u16 value to validate.
///
/// # Returns
///
/// * `Ok(())` if the port is valid.
/// * `Err(&'static str)` if the port is invalid.
pub fn is_valid_port(port: u16) -> Result<(), &'static str> {
    if port > 0 {
        Ok(())
    } else {
        Err("Port must be between 1 and 65535")
    }
}

/// Validates a dotted-quad IPv4 address (`XXX.XXX.XXX.XXX`, each octet 0-255).
///
/// Leading zeros are tolerated (`192.168.019.080`), matching what operators
/// type into instrument front panels. Hostnames and IPv6 are rejected.
pub fn is_valid_ipv4(ip: &str) -> Result<(), &'static str> {
    const MESSAGE: &str = "Invalid IP address format. Use XXX.XXX.XXX.XXX";

    let octets: Vec<&str> = ip.trim().split('.').collect();
    if octets.len() != 4 {
        return Err(MESSAGE);
    }
    for octet in octets {
        if octet.is_empty() || octet.len() > 3 || !octet.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MESSAGE);
        }
        match octet.parse::<u16>() {
            Ok(value) if value <= 255 => {}
            _ => return Err(MESSAGE),
        }
    }
    Ok(())
}

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates that a floating point value is finite and strictly positive.
pub fn is_positive(value: f64) -> Result<(), &'static str> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err("Value must be positive")
    }
}
