//! Output formatting for CLI commands.
//!
//! Every command result is written either as human-readable text or as a
//! pretty-printed JSON object.

use anyhow::Result;
use dedupfs_core::{DedupeStats, GcStats, Hash};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// `text_fn` is only called in text mode.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Report a non-fatal problem on stderr.
    ///
    /// In JSON mode the warning travels in the command's own output object
    /// instead.
    pub fn write_warning(&self, warning: &str) {
        if self.format == OutputFormat::Text {
            let _ = writeln!(io::stderr(), "Warning: {}", warning);
        }
    }

    /// Write an error message to stderr.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// DTOs for JSON output

#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub algorithm: String,
    pub dir_mode: String,
}

/// Output for `dir-symlink` and `lines-symlink` commands.
#[derive(Debug, Serialize)]
pub struct DedupeOutput {
    pub success: bool,
    pub result_code: u8,
    pub source: String,
    #[serde(flatten)]
    pub stats: DedupeStats,
}

impl DedupeOutput {
    pub fn to_text(&self) -> String {
        format!(
            "Scanned {} files\nLinked {} duplicates\nSaved {} bytes\n",
            self.stats.files_scanned, self.stats.duplicates_linked, self.stats.bytes_saved
        )
    }
}

/// Output for `put` command.
#[derive(Debug, Serialize)]
pub struct PutOutput {
    pub success: bool,
    pub result_code: u8,
    pub link: String,
    pub hash: Hash,
    pub data_path: String,
}

/// Output for `mv` command.
#[derive(Debug, Serialize)]
pub struct MoveOutput {
    pub success: bool,
    pub result_code: u8,
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Output for `rm` command.
#[derive(Debug, Serialize)]
pub struct RemoveOutput {
    pub success: bool,
    pub result_code: u8,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Output for `stat` command.
#[derive(Debug, Serialize)]
pub struct StatOutput {
    pub success: bool,
    pub result_code: u8,
    pub link: String,
    pub hash: Hash,
    pub data_path: String,
    /// None when the data file is gone (a broken link).
    pub size: Option<u64>,
}

impl StatOutput {
    pub fn to_text(&self) -> String {
        let size = match self.size {
            Some(size) => format!("{} bytes", size),
            None => "missing data file".to_string(),
        };
        format!(
            "Link: {}\nHash: {}\nPath: {}\nSize: {}\n",
            self.link, self.hash, self.data_path, size
        )
    }
}

/// Output for `gc` command.
#[derive(Debug, Serialize)]
pub struct GcOutput {
    pub success: bool,
    pub result_code: u8,
    pub dry_run: bool,
    #[serde(flatten)]
    pub stats: GcStats,
}

impl GcOutput {
    pub fn to_text(&self) -> String {
        if self.dry_run {
            format!(
                "Dry run - no data files deleted\nWould delete {} data files\nWould free {} bytes\n",
                self.stats.data_files_deleted, self.stats.bytes_freed
            )
        } else {
            format!(
                "Deleted {} data files\nFreed {} bytes\n",
                self.stats.data_files_deleted, self.stats.bytes_freed
            )
        }
    }
}
