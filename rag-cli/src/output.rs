//! Output formatting: every command result implements [`Output`] and renders
//! either a human-readable summary or a JSON document, chosen by the
//! top-level `--format` flag.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};

/// Output format selectable via `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Human,
    /// Pretty-printed JSON, for scripting.
    Json,
}

/// A command result that knows how to render itself in every supported
/// [`OutputFormat`].
pub trait Output {
    fn write<W: Write>(&self, writer: W, format: OutputFormat) -> anyhow::Result<()>
    where
        Self: Serialize,
    {
        match format {
            OutputFormat::Human => self.write_human(writer),
            OutputFormat::Json => self.write_json(writer),
        }
    }

    fn write_human<W: Write>(&self, writer: W) -> anyhow::Result<()>;

    fn write_json<W: Write>(&self, writer: W) -> anyhow::Result<()>
    where
        Self: Serialize,
    {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

impl OutputFormat {
    pub fn print<T: Output + Serialize>(self, data: &T) -> anyhow::Result<()> {
        data.write(io::stdout(), self)?;
        if matches!(self, OutputFormat::Json) {
            println!();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        count: usize,
    }

    impl Output for Sample {
        fn write_human<W: Write>(&self, mut writer: W) -> anyhow::Result<()> {
            writeln!(writer, "count: {}", self.count)?;
            Ok(())
        }
    }

    #[test]
    fn human_format_uses_write_human() {
        let mut buf = Vec::new();
        Sample { count: 3 }.write(&mut buf, OutputFormat::Human).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "count: 3\n");
    }

    #[test]
    fn json_format_serializes_the_struct() {
        let mut buf = Vec::new();
        Sample { count: 3 }.write(&mut buf, OutputFormat::Json).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("\"count\": 3"));
    }
}
