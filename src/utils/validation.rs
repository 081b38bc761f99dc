use crate::domain::model::BindAddress;
use crate::utils::error::{Result, UpdateError};
use std::path::Path;
use std::time::Duration;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_bind(field_name: &str, bind: &str) -> Result<BindAddress> {
    BindAddress::parse(bind).map_err(|e| match e {
        UpdateError::InvalidBind { reason, .. } => UpdateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bind.to_string(),
            reason,
        },
        other => other,
    })
}

pub fn validate_distinct_binds(bind: &BindAddress, temp_bind: &BindAddress) -> Result<()> {
    // 別名 (localhost / 127.0.0.1) 或萬用位址在同一埠上同樣會衝突
    if bind.conflicts_with(temp_bind) {
        return Err(UpdateError::InvalidConfigValueError {
            field: "temp_bind".to_string(),
            value: temp_bind.to_string(),
            reason: format!("Temporary bind overlaps the permanent bind {}", bind),
        });
    }
    Ok(())
}

pub fn validate_path(field_name: &str, path: &Path) -> Result<()> {
    let display = path.to_string_lossy();
    if display.is_empty() {
        return Err(UpdateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: display.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if display.contains('\0') {
        return Err(UpdateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: display.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(UpdateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_timeout(field_name: &str, value: Duration, min: Duration, max: Duration) -> Result<()> {
    if value < min || value > max {
        return Err(UpdateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: format!("{:?}", value),
            reason: format!("Value must be between {:?} and {:?}", min, max),
        });
    }
    Ok(())
}
