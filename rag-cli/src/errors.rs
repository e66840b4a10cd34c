//! Error presentation: wraps an [`anyhow::Error`] with a short, actionable
//! hint for the terminal. No color crate is linked here, so output is plain
//! text — uppercase labels do the work `colored` would otherwise do.

use std::fmt;

/// Adds a one-line "help" suffix to an error before it's shown to a user.
pub trait EnhancedError<T> {
    fn context_with_help(self, help: &str) -> anyhow::Result<T>;
}

impl<T, E> EnhancedError<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context_with_help(self, help: &str) -> anyhow::Result<T> {
        self.map_err(|err| anyhow::anyhow!("{err}\n  help: {help}"))
    }
}

/// Canned help text for the failure modes this crate's commands actually hit.
pub mod helpers {
    pub const CONFIG_ERROR: &[&str] = &[
        "check that --config points at a readable TOML file",
        "api_url, api_key and vectordb_dimension must all be set",
    ];

    pub const EMBEDDING_UNAVAILABLE: &[&str] = &[
        "the embedding endpoint rejected or refused the request",
        "verify api_url and api_key in the engine config",
    ];

    pub const DIARY_NOT_FOUND: &[&str] = &[
        "no persisted index exists yet for this diary",
        "run `rag-diary ingest <path>` first",
    ];

    pub const TAG_NOT_FOUND: &[&str] =
        &["the tag registry has no entry with this name", "run `rag-diary tag stats` to list known tags"];

    pub const STORAGE_ERROR: &[&str] =
        &["the cooccurrence database could not be opened", "check that the state directory is writable"];

    pub const INVALID_INPUT: &[&str] = &["the argument could not be parsed", "see `--help` for the expected form"];
}

/// Render one of the [`helpers`] lists as a single help string.
pub fn format_help(lines: &[&str]) -> String {
    lines.join("; ")
}

/// A formatted, user-facing error message, distinct from the underlying
/// `anyhow::Error`'s debug chain. Not wired into any command path yet; kept
/// for callers that want to build a message without an intermediate `Result`.
#[allow(dead_code)]
pub struct DisplayError<'a> {
    pub message: &'a str,
    pub help: &'a [&'a str],
}

impl fmt::Display for DisplayError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;
        for line in self.help {
            writeln!(f, "  help: {line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_with_help_appends_a_hint() {
        let result: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let err = result.context_with_help("check the path").unwrap_err();
        assert!(err.to_string().contains("check the path"));
    }

    #[test]
    fn display_error_lists_every_help_line() {
        let err = DisplayError { message: "bad config", help: helpers::CONFIG_ERROR };
        let rendered = err.to_string();
        assert!(rendered.contains("bad config"));
        assert!(rendered.contains("api_url"));
    }
}
