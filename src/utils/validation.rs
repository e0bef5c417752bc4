use crate::utils::error::{Result, StackError};
use regex::Regex;
use std::sync::OnceLock;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(StackError::config(field_name, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(StackError::config(field_name, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StackError::config(
            field_name,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(StackError::range(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

pub fn validate_one_of<T: PartialEq + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    allowed: &[T],
) -> Result<()> {
    if !allowed.contains(&value) {
        let allowed_list: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
        return Err(StackError::range(
            field_name,
            value,
            format!("Value must be one of {}", allowed_list.join(", ")),
        ));
    }
    Ok(())
}

/// Logical ids follow the template rules: alphanumeric, 1..=255 chars.
pub fn validate_identifier(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 255 {
        return Err(StackError::InvalidIdentifier {
            id: id.to_string(),
            reason: "length must be between 1 and 255".to_string(),
        });
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StackError::InvalidIdentifier {
            id: id.to_string(),
            reason: "only ASCII letters and digits are allowed".to_string(),
        });
    }
    Ok(())
}

pub fn validate_region(field_name: &str, region: &str) -> Result<()> {
    static REGION_RE: OnceLock<Regex> = OnceLock::new();
    let re = REGION_RE.get_or_init(|| {
        Regex::new(r"^[a-z]{2}(-gov)?-[a-z]+-\d$").expect("region pattern is valid")
    });

    if !re.is_match(region) {
        return Err(StackError::config(
            field_name,
            format!("'{}' does not look like a region (e.g. us-east-1)", region),
        ));
    }
    Ok(())
}

pub fn validate_health_path(field_name: &str, path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(StackError::config(
            field_name,
            format!("Health check path '{}' must start with '/'", path),
        ));
    }
    if path.len() > 1024 {
        return Err(StackError::range(
            field_name,
            path.len(),
            "Health check path is longer than 1024 characters",
        ));
    }
    Ok(())
}
