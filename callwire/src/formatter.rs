use callwire_core::StatusCode;
use callwire_core::tonic::Status;
use colored::*;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<serde_json::Value> for FormattedString {
    fn from(value: serde_json::Value) -> Self {
        FormattedString(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
    }
}

impl From<&Status> for FormattedString {
    fn from(status: &Status) -> Self {
        FormattedString(format!(
            "{} code={:?} message={:?}",
            "gRPC Failed:".red().bold(),
            StatusCode::from(status),
            status.message()
        ))
    }
}

impl From<anyhow::Error> for FormattedString {
    fn from(err: anyhow::Error) -> Self {
        if let Some(status) = err.downcast_ref::<Status>() {
            return FormattedString::from(status);
        }
        FormattedString(format!("{}\n\n'{:#}'", "Error:".red().bold(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_rendered_with_folded_code() {
        colored::control::set_override(false);

        let formatted = FormattedString::from(&Status::unavailable("down"));
        assert_eq!(formatted.0, "gRPC Failed: code=Internal message=\"down\"");

        let err = anyhow::Error::from(Status::deadline_exceeded("slow"));
        let formatted = FormattedString::from(err);
        assert_eq!(
            formatted.0,
            "gRPC Failed: code=DeadlineExceeded message=\"slow\""
        );
    }
}
