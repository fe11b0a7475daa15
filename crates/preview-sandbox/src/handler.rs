//! Worker-side request execution.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use preview_lang::CheckError;
use preview_protocol::{
    FormatOutput, FormatRequest, LintOutput, LintRequest, SandboxFailure, SandboxRequest,
    SandboxResponse, TypecheckOutput, TypecheckRequest,
};
use tracing::debug;

use crate::normalize;

/// Runs one request to completion. Tool errors and panics come back as
/// [`SandboxResponse::Failure`]; nothing escapes as an unwind.
pub fn handle_request(request: SandboxRequest) -> SandboxResponse {
    let tool = request.tool();
    match panic::catch_unwind(AssertUnwindSafe(|| run(request))) {
        Ok(response) => response,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            debug!(%tool, %message, "tool panicked");
            SandboxResponse::Failure(SandboxFailure::panic(format!(
                "{tool} crashed: {message}"
            )))
        }
    }
}

fn run(request: SandboxRequest) -> SandboxResponse {
    match request {
        SandboxRequest::Format(FormatRequest { code, language }) => {
            match preview_lang::format(&code, &language) {
                Ok(formatted) => SandboxResponse::Format(FormatOutput { formatted }),
                Err(error) => SandboxResponse::Failure(SandboxFailure::tool(error.to_string())),
            }
        }
        SandboxRequest::Lint(LintRequest {
            code,
            file_path,
            fix,
        }) => match preview_lang::lint(&code, &file_path, fix) {
            Ok(report) => SandboxResponse::Lint(LintOutput {
                diagnostics: normalize::eslint(&report.messages),
                fixed_code: report.output,
            }),
            Err(error) => SandboxResponse::Failure(SandboxFailure::tool(error.to_string())),
        },
        SandboxRequest::Typecheck(TypecheckRequest {
            files,
            compiler_options,
        }) => match preview_lang::typecheck(files.clone(), compiler_options.as_ref()) {
            Ok(diagnostics) => SandboxResponse::Typecheck(TypecheckOutput {
                diagnostics: normalize::typescript(&diagnostics, &files),
            }),
            Err(error @ CheckError::Violation { .. }) => {
                SandboxResponse::Failure(SandboxFailure::violation(error.to_string()))
            }
            Err(error) => SandboxResponse::Failure(SandboxFailure::tool(error.to_string())),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
