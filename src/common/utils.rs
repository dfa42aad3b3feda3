//! Small shared helpers used by logging and configuration code.

use std::path::Path;
use std::time::Duration;

/// Replace the user's home directory with `~` so paths can be logged safely.
pub fn private_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        return format!("~/{}", stripped.display());
    }
    path.display().to_string()
}

/// Human friendly duration for log lines: `45s`, `5m`, `1m 30s`, `indefinite`.
pub fn format_duration(duration: Option<Duration>) -> String {
    let Some(duration) = duration else {
        return "indefinite".to_string();
    };
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
