//! timecard CLI
//!
//! Generates timecard spreadsheets from JSON requests, converts them to PDF
//! and emails them.

mod commands;
mod config;
mod convert;
mod mail;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use timecard_core::{decode_email_request, decode_request, DecodeError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{FileConfig, Overrides, Settings};
use crate::convert::SofficeConverter;

/// Exit code for requests that could not be decoded
const EXIT_BAD_REQUEST: u8 = 2;

#[derive(Parser)]
#[command(name = "timecard")]
#[command(author, version, about = "Timecard spreadsheet generator", long_about = None)]
struct Cli {
    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file [default: ./timecard.toml when present]
    #[arg(long, env = "TIMECARD_CONFIG", global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Template workbook [default: template.xlsx]
    #[arg(long, env = "TIMECARD_TEMPLATE", global = true, value_name = "FILE")]
    template: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the timecard spreadsheet
    Generate {
        /// Request JSON file, or - for stdin
        #[arg(value_name = "REQUEST")]
        request: PathBuf,

        /// Output file [default: timecard_<employee>.xlsx]
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write the timecard as PDF
    Pdf {
        /// Request JSON file, or - for stdin
        #[arg(value_name = "REQUEST")]
        request: PathBuf,

        /// Output file [default: timecard_<employee>.pdf]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Office suite used for conversion [default: soffice]
        #[arg(long, env = "TIMECARD_SOFFICE", value_name = "PROGRAM")]
        soffice: Option<String>,

        /// Seconds to wait for the conversion [default: 120]
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Email the timecard spreadsheet
    Email {
        /// Email request JSON file, or - for stdin
        #[arg(value_name = "REQUEST")]
        request: PathBuf,

        /// SMTP relay host
        #[arg(long, env = "SMTP_HOST", value_name = "HOST")]
        smtp_host: Option<String>,

        /// SMTP relay port (465 for implicit TLS, otherwise STARTTLS)
        #[arg(long, env = "SMTP_PORT", value_name = "PORT")]
        smtp_port: Option<u16>,

        /// SMTP login
        #[arg(long, env = "SMTP_USER", value_name = "USER")]
        smtp_user: Option<String>,

        /// SMTP password
        #[arg(long, env = "SMTP_PASS", hide_env_values = true, value_name = "PASSWORD")]
        smtp_pass: Option<String>,

        /// Sender address [default: the SMTP login]
        #[arg(long, env = "SMTP_FROM")]
        from: Option<String>,

        /// Deliver through this sendmail-compatible program instead of SMTP
        #[arg(long, env = "TIMECARD_SENDMAIL", value_name = "PROGRAM")]
        sendmail: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            if err.downcast_ref::<DecodeError>().is_some() {
                ExitCode::from(EXIT_BAD_REQUEST)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// `RUST_LOG` wins; otherwise each `-v` lowers the threshold one level
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let file = FileConfig::discover(cli.config.as_deref())?;
    let mut overrides = Overrides {
        template: cli.template,
        ..Overrides::default()
    };

    match cli.command {
        Commands::Generate { request, output } => {
            let settings = Settings::resolve(overrides, file)?;
            let request = decode_request(&read_input(&request)?).context("decoding request")?;
            let rendered = commands::generate(&request, &settings)?;
            let output = output.unwrap_or_else(|| commands::output_name(&request.employee_name, "xlsx").into());
            write_output(&output, &rendered.bytes)?;
        }
        Commands::Pdf {
            request,
            output,
            soffice,
            timeout,
        } => {
            overrides.converter = soffice;
            overrides.converter_timeout_secs = timeout;
            let settings = Settings::resolve(overrides, file)?;
            let request = decode_request(&read_input(&request)?).context("decoding request")?;
            let converter = SofficeConverter::from_settings(&settings.converter);
            let pdf = commands::pdf(&request, &settings, &converter)?;
            let output = output.unwrap_or_else(|| commands::output_name(&request.employee_name, "pdf").into());
            write_output(&output, &pdf)?;
        }
        Commands::Email {
            request,
            smtp_host,
            smtp_port,
            smtp_user,
            smtp_pass,
            from,
            sendmail,
        } => {
            overrides.smtp_host = smtp_host;
            overrides.smtp_port = smtp_port;
            overrides.smtp_user = smtp_user;
            overrides.smtp_password = smtp_pass;
            overrides.from = from;
            overrides.sendmail = sendmail;
            let settings = Settings::resolve(overrides, file)?;
            let request = decode_email_request(&read_input(&request)?).context("decoding request")?;
            let transport = mail::mail_transport(&settings.mail)?;
            let today = chrono::Local::now().date_naive();
            let status = commands::email(&request, &settings, transport.as_ref(), today)?;
            println!("{}", serde_json::to_string(&status)?);
        }
    }

    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut body = Vec::new();
        io::stdin()
            .read_to_end(&mut body)
            .context("reading request from stdin")?;
        return Ok(body);
    }
    fs::read(path).with_context(|| format!("reading request {}", path.display()))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote: {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
