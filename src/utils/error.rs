use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Reference error: {referrer} references undeclared resource '{target}'")]
    Reference { referrer: String, target: String },

    #[error("Range error: {field} = {value} ({reason})")]
    Range {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Conflict error: resource identifier '{id}' is already declared")]
    Conflict { id: String },

    #[error("Invalid identifier '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: String },

    #[error("Configuration error in {field}: {message}")]
    Config { field: String, message: String },

    #[error("Asset error for '{path}': {reason}")]
    Asset { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML rendering error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, StackError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 資源圖定義錯誤 (reference / range / conflict)
    Definition,
    Configuration,
    Asset,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl StackError {
    pub fn range(field: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        StackError::Range {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn reference(referrer: &str, target: &str) -> Self {
        StackError::Reference {
            referrer: referrer.to_string(),
            target: target.to_string(),
        }
    }

    pub fn config(field: &str, message: impl Into<String>) -> Self {
        StackError::Config {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            StackError::Reference { .. }
            | StackError::Range { .. }
            | StackError::Conflict { .. }
            | StackError::InvalidIdentifier { .. } => ErrorCategory::Definition,
            StackError::Config { .. } | StackError::TomlParse(_) => ErrorCategory::Configuration,
            StackError::Asset { .. } => ErrorCategory::Asset,
            StackError::Io(_) | StackError::Serialization(_) | StackError::Yaml(_) => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Definition | ErrorCategory::Configuration => ErrorSeverity::High,
            // 映像目錄可以補上後重跑，或用 --skip-assets 略過
            ErrorCategory::Asset => ErrorSeverity::Medium,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            StackError::Reference { target, .. } => format!(
                "Declare '{}' in the configuration or fix the identifier that points at it",
                target
            ),
            StackError::Range { field, .. } => {
                format!("Adjust '{}' to a value the provider accepts", field)
            }
            StackError::Conflict { id } => {
                format!("Give one of the resources named '{}' a different id", id)
            }
            StackError::InvalidIdentifier { .. } => {
                "Identifiers must be alphanumeric (A-Z, a-z, 0-9) and at most 255 characters"
                    .to_string()
            }
            StackError::Config { field, .. } => format!("Check the '{}' setting", field),
            StackError::TomlParse(_) => {
                "Make sure the configuration file is valid TOML".to_string()
            }
            StackError::Asset { .. } => {
                "Check the image build context path, or pass --skip-assets".to_string()
            }
            StackError::Io(_) => "Check file permissions and the output directory".to_string(),
            StackError::Serialization(_) | StackError::Yaml(_) => {
                "This is a bug in template rendering; please report it".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Definition => format!("Invalid stack definition: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Asset => format!("Asset problem: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_errors_are_high_severity() {
        let err = StackError::reference("MatomoTarget", "MissingService");
        assert_eq!(err.category(), ErrorCategory::Definition);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.to_string().contains("MissingService"));
    }

    #[test]
    fn test_io_error_is_critical() {
        let err: StackError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().starts_with("System error"));
    }
}
