use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidJson,

    DatabaseNotFound,
    DatabaseError,

    CatalogFileNotFound,
    CatalogInvalidYaml,
    CatalogLoadFailed,

    CabinetLoadFailed,

    DownloadFailed,

    VerifyFailed,

    ReleaseNotFound,
    ReleaseAuthMissing,
    ReleaseUploadFailed,

    PipelineStepFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",

            ErrorCode::DatabaseNotFound => "database.not_found",
            ErrorCode::DatabaseError => "database.error",

            ErrorCode::CatalogFileNotFound => "catalog.file_not_found",
            ErrorCode::CatalogInvalidYaml => "catalog.invalid_yaml",
            ErrorCode::CatalogLoadFailed => "catalog.load_failed",

            ErrorCode::CabinetLoadFailed => "cabinet.load_failed",

            ErrorCode::DownloadFailed => "download.failed",

            ErrorCode::VerifyFailed => "verify.failed",

            ErrorCode::ReleaseNotFound => "release.not_found",
            ErrorCode::ReleaseAuthMissing => "release.auth_missing",
            ErrorCode::ReleaseUploadFailed => "release.upload_failed",

            ErrorCode::PipelineStepFailed => "pipeline.step_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseErrorDetails {
    pub path: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFailedDetails {
    pub url: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDetails {
    pub repo: String,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn validation_invalid_json(
        err: serde_json::Error,
        context: Option<String>,
        input: Option<String>,
    ) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
            "input": input,
        });

        Self::new(ErrorCode::ValidationInvalidJson, "Invalid JSON", details)
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigInvalidJson,
            format!("Configuration file '{}' is not valid JSON", path),
            serde_json::json!({ "path": path, "error": err.to_string() }),
        )
        .with_hint("Run `marketplace config reset` to restore built-in defaults")
    }

    pub fn database_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::DatabaseNotFound,
            format!("Database file '{}' not found", path),
            serde_json::json!({ "path": path }),
        )
        .with_hint("Run 'marketplace schema --db-path <path>' first")
    }

    /// Wrap a SQLite failure with the database path and the operation that failed.
    pub fn database(path: impl Into<String>, err: rusqlite::Error, context: &str) -> Self {
        let details = to_details(DatabaseErrorDetails {
            path: path.into(),
            error: err.to_string(),
            context: Some(context.to_string()),
        });

        Self::new(
            ErrorCode::DatabaseError,
            format!("SQLite error during {}: {}", context, err),
            details,
        )
    }

    pub fn catalog_file_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::CatalogFileNotFound,
            format!("YAML file not found at '{}'", path),
            serde_json::json!({ "path": path }),
        )
    }

    pub fn catalog_invalid_yaml(path: impl Into<String>, problem: impl Into<String>) -> Self {
        let path = path.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::CatalogInvalidYaml,
            format!("Invalid catalog file '{}': {}", path, problem),
            serde_json::json!({ "path": path, "problem": problem }),
        )
    }

    pub fn catalog_load_failed(catalog: impl Into<String>, err: rusqlite::Error) -> Self {
        let catalog = catalog.into();
        Self::new(
            ErrorCode::CatalogLoadFailed,
            format!("Error inserting catalog '{}': {}", catalog, err),
            serde_json::json!({ "catalogName": catalog, "error": err.to_string() }),
        )
        .with_hint("All catalog inserts were rolled back")
    }

    pub fn cabinet_load_failed(message: impl Into<String>, details: Value) -> Self {
        Self::new(ErrorCode::CabinetLoadFailed, message, details)
    }

    pub fn download_failed(
        url: impl Into<String>,
        error: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        let url = url.into();
        let error = error.into();
        let message = match status {
            Some(code) => format!("Download of '{}' failed with HTTP {}", url, code),
            None => format!("Download of '{}' failed: {}", url, error),
        };

        let mut err = Self::new(
            ErrorCode::DownloadFailed,
            message,
            to_details(DownloadFailedDetails { url, error, status }),
        );
        err.retryable = Some(status.map_or(true, |code| code >= 500));
        err
    }

    pub fn verify_failed(path: impl Into<String>, problem: impl Into<String>) -> Self {
        let path = path.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::VerifyFailed,
            format!("Verification of '{}' failed: {}", path, problem),
            serde_json::json!({ "path": path, "problem": problem }),
        )
    }

    pub fn release_not_found(repo: impl Into<String>, tag: impl Into<String>) -> Self {
        let details = to_details(ReleaseDetails {
            repo: repo.into(),
            tag: tag.into(),
            status: Some(404),
            body: None,
        });
        Self::new(ErrorCode::ReleaseNotFound, "Release not found", details)
            .with_hint("Publish the release before uploading assets to it")
    }

    pub fn release_auth_missing(env_var: impl Into<String>) -> Self {
        let env_var = env_var.into();
        Self::new(
            ErrorCode::ReleaseAuthMissing,
            format!("Environment variable {} is not set", env_var),
            serde_json::json!({ "env": env_var }),
        )
        .with_hint("Export a token with permission to write release assets")
    }

    pub fn release_upload_failed(
        repo: impl Into<String>,
        tag: impl Into<String>,
        status: Option<u16>,
        body: Option<String>,
    ) -> Self {
        let details = to_details(ReleaseDetails {
            repo: repo.into(),
            tag: tag.into(),
            status,
            body,
        });
        Self::new(
            ErrorCode::ReleaseUploadFailed,
            "Release asset upload failed",
            details,
        )
    }

    pub fn pipeline_step_failed(step_id: impl Into<String>, error: &Error) -> Self {
        let step_id = step_id.into();
        Self::new(
            ErrorCode::PipelineStepFailed,
            format!("Step '{}' failed: {}", step_id, error.message),
            serde_json::json!({
                "step": step_id,
                "code": error.code.as_str(),
                "details": error.details,
            }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::internal_unexpected(message)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}
