//! Validation functions for configuration values.

use std::path::Path;
use validator::{Validate, ValidationError};

pub fn validate_dir_exist<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} not found", dir).into()));
    }

    Ok(())
}

pub fn validate_dir_exist_or_created<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return std::fs::create_dir_all(dir).map_err(|e| {
            ValidationError::new("InvalidDirectory").with_message(
                format!("cannot create or access directory {:?}: {}", dir, e).into(),
            )
        });
    }

    Ok(())
}

pub fn validate_file_exist<P: AsRef<Path>>(file: P) -> Result<(), ValidationError> {
    let file = file.as_ref();
    if !file.is_file() {
        return Err(ValidationError::new("InvalidFile")
            .with_message(format!("{:?} not found or not a file", file).into()));
    }

    Ok(())
}

/// Runs the validation of a nested value and reports it as a field error.
pub fn validate_inner<V: Validate>(value: &V) -> Result<(), ValidationError> {
    value.validate().map_err(|e| {
        ValidationError::new("InvalidNestedValue").with_message(e.to_string().into())
    })
}
