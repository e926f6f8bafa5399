//! JSON envelope printed by every command, plus the error-code to exit-code table.

use marketplace::error::Hint;
use marketplace::{Error, ErrorCode, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl From<&Error> for CliError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            details: err.details.clone(),
            hints: err.hints.clone(),
            retryable: err.retryable,
        }
    }
}

impl CliResponse<serde_json::Value> {
    pub fn from_result(result: Result<serde_json::Value>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(err) => Self {
                success: false,
                data: None,
                error: Some(CliError::from(&err)),
            },
        }
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) -> Result<()> {
    use std::io::{self, Write};

    let payload = serde_json::to_string_pretty(response).map_err(|e| {
        Error::internal_json(e.to_string(), Some("serialize response".to_string()))
    })?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match writeln!(handle, "{}", payload) {
        Ok(()) => Ok(()),
        // Reader went away (e.g. piped into `head`)
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(Error::internal_io(
            e.to_string(),
            Some("write stdout".to_string()),
        )),
    }
}

pub fn print_json_result(result: Result<serde_json::Value>) -> Result<()> {
    print_response(&CliResponse::from_result(result))
}

/// Serialize a command's data; failures map to their exit code.
pub fn map_cmd_result_to_json<T: Serialize>(
    result: Result<(T, i32)>,
) -> (Result<serde_json::Value>, i32) {
    match result {
        Ok((data, exit_code)) => match serde_json::to_value(data) {
            Ok(value) => (Ok(value), exit_code),
            Err(err) => (
                Err(Error::internal_json(
                    err.to_string(),
                    Some("serialize response".to_string()),
                )),
                1,
            ),
        },
        Err(err) => {
            let exit_code = exit_code_for_error(err.code);
            (Err(err), exit_code)
        }
    }
}

fn exit_code_for_error(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::ConfigInvalidJson
        | ErrorCode::ConfigInvalidValue
        | ErrorCode::ValidationMissingArgument
        | ErrorCode::ValidationInvalidArgument
        | ErrorCode::ValidationInvalidJson => 2,

        ErrorCode::DatabaseNotFound | ErrorCode::ReleaseNotFound => 4,

        ErrorCode::DatabaseError
        | ErrorCode::CatalogFileNotFound
        | ErrorCode::CatalogInvalidYaml
        | ErrorCode::CatalogLoadFailed
        | ErrorCode::CabinetLoadFailed
        | ErrorCode::VerifyFailed => 10,

        ErrorCode::DownloadFailed
        | ErrorCode::ReleaseAuthMissing
        | ErrorCode::ReleaseUploadFailed
        | ErrorCode::PipelineStepFailed => 20,

        ErrorCode::InternalIoError
        | ErrorCode::InternalJsonError
        | ErrorCode::InternalUnexpected => 1,
    }
}
