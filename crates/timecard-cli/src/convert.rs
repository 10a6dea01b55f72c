//! Spreadsheet → PDF conversion through an office suite running headless

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ConverterSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const FALLBACK_INPUT_NAME: &str = "timecard.xlsx";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("could not prepare conversion: {0}")]
    Io(#[from] io::Error),

    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} conversion failed ({status})\nOutput: {output}")]
    Failed {
        program: String,
        status: ExitStatus,
        output: String,
    },

    #[error("{program} did not finish within {}s\nOutput: {output}", timeout.as_secs())]
    TimedOut {
        program: String,
        timeout: Duration,
        output: String,
    },

    #[error("no PDF generated by {program}\nOutput: {output}")]
    NoOutput { program: String, output: String },
}

/// Turns a spreadsheet into a document
pub trait DocumentConverter {
    /// `file_name` is the name the spreadsheet is converted under; converters
    /// that derive the output name from it will keep its stem.
    fn convert(&self, xlsx: &[u8], file_name: &str) -> Result<Vec<u8>, ConvertError>;
}

/// Runs `<program> [args..] --headless --convert-to pdf --outdir <dir> <file>`
#[derive(Clone, Debug)]
pub struct SofficeConverter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl SofficeConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(crate::config::DEFAULT_CONVERTER_TIMEOUT_SECS),
        }
    }

    pub fn from_settings(settings: &ConverterSettings) -> Self {
        Self::new(settings.program.clone())
            .args(settings.args.clone())
            .timeout(settings.timeout)
    }

    /// Arguments passed ahead of the conversion flags
    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for `child`, killing it once the timeout has passed.
    /// `None` means it was killed.
    fn wait(&self, child: &mut Child) -> io::Result<Option<ExitStatus>> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                if let Err(err) = child.kill() {
                    warn!(program = %self.program, %err, "could not kill converter");
                }
                child.wait()?;
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(self.timeout - elapsed));
        }
    }
}

impl Default for SofficeConverter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CONVERTER)
    }
}

impl DocumentConverter for SofficeConverter {
    fn convert(&self, xlsx: &[u8], file_name: &str) -> Result<Vec<u8>, ConvertError> {
        let work = tempfile::Builder::new().prefix("timecard-pdf-").tempdir()?;
        let input = work.path().join(input_name(file_name));
        fs::write(&input, xlsx)?;
        let outdir = work.path().join("out");
        fs::create_dir(&outdir)?;
        let log_path = work.path().join("convert.log");
        let log = File::create(&log_path)?;

        debug!(program = %self.program, input = %input.display(), "converting to PDF");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(&outdir)
            .arg(&input)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log)
            .spawn()
            .map_err(|source| ConvertError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let status = self.wait(&mut child)?;
        let output = fs::read_to_string(&log_path).unwrap_or_default();
        let program = self.program.clone();

        let Some(status) = status else {
            return Err(ConvertError::TimedOut {
                program,
                timeout: self.timeout,
                output,
            });
        };
        if !status.success() {
            return Err(ConvertError::Failed {
                program,
                status,
                output,
            });
        }
        debug!(output = output.trim(), "converter finished");

        let Some(pdf) = first_file(&outdir)? else {
            return Err(ConvertError::NoOutput { program, output });
        };
        let bytes = fs::read(&pdf)?;
        info!(bytes = bytes.len(), "generated PDF");
        Ok(bytes)
    }
}

fn input_name(file_name: &str) -> OsString {
    Path::new(file_name)
        .file_name()
        .filter(|name| !name.is_empty())
        .map_or_else(|| OsString::from(FALLBACK_INPUT_NAME), ToOwned::to_owned)
}

/// First regular file in `dir`, by name
fn first_file(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files.into_iter().next())
}
