use termfleet_core::{CommandOutput, RemoteError};

/// Progress chatter that container engines write to stderr on perfectly
/// healthy operations. Presence of any of these markers means the command
/// is not treated as failed just because stderr is non-empty.
const BENIGN_STDERR_MARKERS: &[&str] = &[
    "Creating",
    "Created",
    "Starting",
    "Started",
    "Stopping",
    "Stopped",
    "Removing",
    "Removed",
    "Pulling",
    "Pulled",
    "Recreating",
    "network",
    "done",
];

/// Classify the captured streams of a completed remote command.
///
/// Non-zero exit is always a failure. With a zero exit, stderr text is only
/// a failure when it carries no benign marker and there is no stdout to
/// report instead.
pub fn classify_output(
    command: &str,
    exit_ok: bool,
    stdout: String,
    stderr: String,
) -> Result<CommandOutput, RemoteError> {
    if !exit_ok {
        return Err(RemoteError::Command {
            command: command.to_string(),
            stdout,
            stderr,
        });
    }

    let stderr_trimmed = stderr.trim();
    if !stderr_trimmed.is_empty() {
        let benign = BENIGN_STDERR_MARKERS.iter().any(|m| stderr.contains(m));
        if !benign && stdout.trim().is_empty() {
            return Err(RemoteError::Command {
                command: command.to_string(),
                stdout,
                stderr,
            });
        }
    }

    Ok(CommandOutput { stdout, stderr })
}
