//! Settings resolution
//!
//! Each setting is taken from the first source that supplies it:
//!
//! 1. command-line flag
//! 2. environment variable (clap reads both into [`Overrides`])
//! 3. config file (`--config FILE`, or `./timecard.toml` when present)
//! 4. built-in default
//!
//! ```toml
//! template = "templates/timecard.xlsx"
//!
//! [converter]
//! program = "soffice"
//! timeout_secs = 120
//!
//! [mail]
//! from = "payroll@example.com"
//!
//! [mail.smtp]
//! host = "smtp.example.com"
//! port = 587
//! user = "payroll@example.com"
//! password = "..."
//! ```
//!
//! Mail goes out over SMTP unless `mail.sendmail` names a local
//! sendmail-compatible program.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "timecard.toml";
pub const DEFAULT_TEMPLATE: &str = "template.xlsx";
pub const DEFAULT_CONVERTER: &str = "soffice";
pub const DEFAULT_CONVERTER_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("converter timeout must be at least one second")]
    ZeroTimeout,
}

/// Contents of the TOML config file; every key is optional
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub template: Option<PathBuf>,
    pub converter: ConverterFile,
    pub mail: MailFile,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterFile {
    pub program: Option<String>,
    /// Arguments placed before the conversion flags, e.g. for wrappers like
    /// `flatpak run org.libreoffice.LibreOffice`
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MailFile {
    pub from: Option<String>,
    pub sendmail: Option<PathBuf>,
    pub smtp: SmtpFile,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmtpFile {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl FileConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Load `explicit`, which must exist, or the default file if there is one.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default = Path::new(DEFAULT_CONFIG_FILE);
        if default.is_file() {
            Self::load(default)
        } else {
            Ok(Self::default())
        }
    }
}

/// Values given on the command line or through the environment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub template: Option<PathBuf>,
    pub converter: Option<String>,
    pub converter_timeout_secs: Option<u64>,
    pub from: Option<String>,
    pub sendmail: Option<PathBuf>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub template: PathBuf,
    pub converter: ConverterSettings,
    pub mail: MailSettings,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConverterSettings {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MailSettings {
    /// Envelope and header sender
    pub from: Option<String>,
    pub smtp: SmtpSettings,
    /// Local program used instead of SMTP when set
    pub sendmail: Option<PathBuf>,
}

impl MailSettings {
    /// The configured sender, else the SMTP login
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().or(self.smtp.user.as_deref())
    }
}

/// SMTP relay settings; blank values count as unset
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl Settings {
    pub fn resolve(overrides: Overrides, file: FileConfig) -> Result<Self, ConfigError> {
        let timeout_secs = overrides
            .converter_timeout_secs
            .or(file.converter.timeout_secs)
            .unwrap_or(DEFAULT_CONVERTER_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(Self {
            template: overrides
                .template
                .or(file.template)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE)),
            converter: ConverterSettings {
                program: overrides
                    .converter
                    .or(file.converter.program)
                    .unwrap_or_else(|| DEFAULT_CONVERTER.to_string()),
                args: file.converter.args,
                timeout: Duration::from_secs(timeout_secs),
            },
            mail: MailSettings {
                from: non_blank(overrides.from).or_else(|| non_blank(file.mail.from)),
                smtp: SmtpSettings {
                    host: non_blank(overrides.smtp_host).or_else(|| non_blank(file.mail.smtp.host)),
                    port: overrides.smtp_port.or(file.mail.smtp.port),
                    user: non_blank(overrides.smtp_user).or_else(|| non_blank(file.mail.smtp.user)),
                    password: non_blank(overrides.smtp_password).or_else(|| non_blank(file.mail.smtp.password)),
                },
                sendmail: overrides
                    .sendmail
                    .or(file.mail.sendmail)
                    .filter(|program| !program.as_os_str().is_empty()),
            },
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template: PathBuf::from(DEFAULT_TEMPLATE),
            converter: ConverterSettings {
                program: DEFAULT_CONVERTER.to_string(),
                args: Vec::new(),
                timeout: Duration::from_secs(DEFAULT_CONVERTER_TIMEOUT_SECS),
            },
            mail: MailSettings::default(),
        }
    }
}
