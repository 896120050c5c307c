//! Small value checks shared by configuration validation.
use std::ops::RangeInclusive;

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

/// Validates if a given string is not empty.
///
/// # Arguments
///
/// * `value` - The string to validate.
///
/// # Returns
///
/// * `Ok(())` if the string is not empty.
/// * `Err(&'static str)` if the string is empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates that a floating point value is finite and strictly positive.
pub fn is_positive(value: f64) -> Result<(), &'static str> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err("Value must be a finite number greater than 0")
    }
}

/// Validates that a calibration gain can be divided by.
pub fn is_usable_gain(gain: f64) -> Result<(), &'static str> {
    if gain.is_finite() && gain != 0.0 {
        Ok(())
    } else {
        Err("Gain must be finite and non-zero")
    }
}

/// Validates that a scaler channel index addresses a channel of the record.
pub fn is_valid_channel(channel: usize, num_channels: usize) -> Result<(), &'static str> {
    if channel < num_channels {
        Ok(())
    } else {
        Err("Channel index is outside the scaler record")
    }
}
