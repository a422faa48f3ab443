pub mod classify;
pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;

use serde::Serialize;

/// Exit code and the text printed to stdout for one command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'a str>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::report(
            0,
            &CommandOutcome { command, status: "ok", error_class: None, message: message.into() },
        )
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::report(
            exit_code,
            &CommandOutcome {
                command,
                status: "error",
                error_class: Some(error_class),
                message: message.into(),
            },
        )
    }

    /// Pretty-printed payload for commands that return structured data.
    pub fn report(exit_code: u8, payload: &impl Serialize) -> Self {
        let output = serde_json::to_string_pretty(payload)
            .unwrap_or_else(|error| serialization_failure(&error));
        Self { exit_code, output }
    }
}

fn serialization_failure(error: &serde_json::Error) -> String {
    format!(
        "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
        error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
    )
}
