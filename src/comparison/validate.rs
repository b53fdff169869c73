use crate::error::ValidationError;

const MAX_NAME_LEN: usize = 255;

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("longer than 255 bytes"));
    }
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(invalid("must not contain path separators or '..'"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("must not contain control characters"));
    }
    Ok(())
}

pub fn validate_threshold(threshold: f64) -> Result<f64, ValidationError> {
    if threshold.is_finite() && threshold >= 0.0 {
        Ok(threshold)
    } else {
        Err(ValidationError::InvalidThreshold(threshold))
    }
}
