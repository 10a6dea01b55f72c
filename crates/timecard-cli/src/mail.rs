//! Timecard email: MIME assembly and delivery over SMTP or sendmail

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::NaiveDate;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, SmtpTransport, Transport};
use thiserror::Error;
use tracing::debug;

use crate::config::{MailSettings, SmtpSettings};

pub const BOUNDARY: &str = "==BOUNDARY==";
const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const BASE64_LINE_LEN: usize = 76;
/// Implicit TLS; every other port upgrades with STARTTLS
const SMTPS_PORT: u16 = 465;
const SMTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP not configured (set SMTP_HOST, SMTP_PORT, SMTP_USER and SMTP_PASS)")]
    NotConfigured,

    #[error("no sender address (set SMTP_FROM or SMTP_USER)")]
    NoSender,

    #[error("invalid address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("invalid envelope: {0}")]
    Envelope(#[from] lettre::error::Error),

    #[error("SMTP: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("no recipients")]
    NoRecipients,

    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("mail delivery: {0}")]
    Io(#[from] io::Error),
}

/// Comma-separated address list → trimmed addresses, blanks dropped
pub fn split_recipients(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(String::from)
        .collect()
}

/// `timecard_<employee name, spaces as underscores>_<YYYY-MM-DD>.xlsx`
pub fn attachment_file_name(employee_name: &str, date: NaiveDate) -> String {
    format!(
        "timecard_{}_{}.xlsx",
        employee_name.replace(' ', "_"),
        date.format("%Y-%m-%d")
    )
}

/// A `multipart/mixed` message with a plain-text body and, when
/// `attachment` is non-empty, the spreadsheet as a base64 part.
pub fn build_message(
    from: &str,
    to: &[String],
    cc: &[String],
    subject: &str,
    body: &str,
    attachment: &[u8],
    file_name: &str,
) -> String {
    let mut msg = String::new();

    msg.push_str(&format!("From: {from}\r\n"));
    msg.push_str(&format!("To: {}\r\n", to.join(", ")));
    if !cc.is_empty() {
        msg.push_str(&format!("Cc: {}\r\n", cc.join(", ")));
    }
    msg.push_str(&format!("Subject: {subject}\r\n"));
    msg.push_str("MIME-Version: 1.0\r\n");
    msg.push_str(&format!("Content-Type: multipart/mixed; boundary=\"{BOUNDARY}\"\r\n\r\n"));

    msg.push_str(&format!("--{BOUNDARY}\r\n"));
    msg.push_str("Content-Type: text/plain; charset=\"utf-8\"\r\n\r\n");
    msg.push_str(body);
    msg.push_str("\r\n\r\n");

    if !attachment.is_empty() {
        msg.push_str(&format!("--{BOUNDARY}\r\n"));
        msg.push_str(&format!("Content-Type: {XLSX_CONTENT_TYPE}\r\n"));
        msg.push_str(&format!("Content-Disposition: attachment; filename=\"{file_name}\"\r\n"));
        msg.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        let encoded = STANDARD.encode(attachment);
        for line in encoded.as_bytes().chunks(BASE64_LINE_LEN) {
            msg.push_str(&String::from_utf8_lossy(line));
            msg.push_str("\r\n");
        }
        msg.push_str("\r\n");
    }

    msg.push_str(&format!("--{BOUNDARY}--\r\n"));
    msg
}

/// Sender and recipients as handed to the transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    /// `To` addresses followed by `Cc` addresses
    pub recipients: Vec<String>,
}

impl Envelope {
    pub fn new(from: impl Into<String>, recipients: Vec<String>) -> Result<Self, MailError> {
        let from = from.into();
        if from.trim().is_empty() {
            return Err(MailError::NoSender);
        }
        if recipients.is_empty() {
            return Err(MailError::NoRecipients);
        }
        Ok(Self { from, recipients })
    }
}

pub trait MailTransport {
    fn send(&self, envelope: &Envelope, message: &[u8]) -> Result<(), MailError>;
}

/// Pipes the message into `<program> -i -f <from> -- <recipients..>`
#[derive(Clone, Debug)]
pub struct SendmailTransport {
    program: PathBuf,
}

impl SendmailTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MailTransport for SendmailTransport {
    fn send(&self, envelope: &Envelope, message: &[u8]) -> Result<(), MailError> {
        let program = self.program.display().to_string();
        debug!(%program, from = %envelope.from, recipients = ?envelope.recipients, "sending mail");

        let mut child = Command::new(&self.program)
            .args(["-i", "-f"])
            .arg(&envelope.from)
            .arg("--")
            .args(&envelope.recipients)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MailError::Spawn {
                program: program.clone(),
                source,
            })?;

        // stdin is closed when the handle drops at the end of this statement
        let written = child
            .stdin
            .take()
            .map_or(Ok(()), |mut stdin| stdin.write_all(message));
        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(MailError::Failed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;
        Ok(())
    }
}

/// Complete SMTP relay settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl SmtpConfig {
    /// All four values are required.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self, MailError> {
        match settings {
            SmtpSettings {
                host: Some(host),
                port: Some(port),
                user: Some(user),
                password: Some(password),
            } => Ok(Self {
                host: host.clone(),
                port: *port,
                user: user.clone(),
                password: password.clone(),
            }),
            _ => Err(MailError::NotConfigured),
        }
    }
}

/// Authenticated delivery through an SMTP relay
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let builder = if config.port == SMTPS_PORT {
            SmtpTransport::relay(&config.host)?
        } else {
            SmtpTransport::starttls_relay(&config.host)?
        };
        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(config.user.clone(), config.password.clone()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        Ok(Self { transport })
    }
}

fn parse_address(address: &str) -> Result<Address, MailError> {
    address.parse().map_err(|source| MailError::Address {
        address: address.to_string(),
        source,
    })
}

impl MailTransport for SmtpMailer {
    fn send(&self, envelope: &Envelope, message: &[u8]) -> Result<(), MailError> {
        debug!(from = %envelope.from, recipients = ?envelope.recipients, "sending mail over SMTP");
        let from = parse_address(&envelope.from)?;
        let to = envelope
            .recipients
            .iter()
            .map(|address| parse_address(address))
            .collect::<Result<Vec<_>, _>>()?;
        let envelope = lettre::address::Envelope::new(Some(from), to)?;
        self.transport.send_raw(&envelope, message)?;
        Ok(())
    }
}

/// sendmail when one is configured, otherwise SMTP
pub fn mail_transport(settings: &MailSettings) -> Result<Box<dyn MailTransport>, MailError> {
    if let Some(program) = &settings.sendmail {
        return Ok(Box::new(SendmailTransport::new(program)));
    }
    let config = SmtpConfig::from_settings(&settings.smtp)?;
    Ok(Box::new(SmtpMailer::new(&config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn recipients_are_trimmed() {
        assert_eq!(
            split_recipients(" a@x.com, b@y.com ,c@z.com"),
            addrs(&["a@x.com", "b@y.com", "c@z.com"])
        );
        assert_eq!(split_recipients("a@x.com,,"), addrs(&["a@x.com"]));
        assert!(split_recipients("").is_empty());
    }

    #[test]
    fn attachment_name_uses_underscores_and_date() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(
            attachment_file_name("Ada King Lovelace", date),
            "timecard_Ada_King_Lovelace_2025-01-10.xlsx"
        );
    }

    #[test]
    fn message_without_attachment() {
        let msg = build_message(
            "payroll@example.com",
            &addrs(&["a@x.com", "b@y.com"]),
            &[],
            "Week 1",
            "Hours attached.",
            &[],
            "unused.xlsx",
        );
        assert_eq!(
            msg,
            "From: payroll@example.com\r\n\
             To: a@x.com, b@y.com\r\n\
             Subject: Week 1\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"==BOUNDARY==\"\r\n\r\n\
             --==BOUNDARY==\r\n\
             Content-Type: text/plain; charset=\"utf-8\"\r\n\r\n\
             Hours attached.\r\n\r\n\
             --==BOUNDARY==--\r\n"
        );
    }

    #[test]
    fn message_with_cc_and_attachment() {
        let attachment = vec![0xAB_u8; 100];
        let msg = build_message(
            "payroll@example.com",
            &addrs(&["a@x.com"]),
            &addrs(&["boss@x.com", "hr@x.com"]),
            "Timecard",
            "",
            &attachment,
            "timecard_Ada_2025-01-10.xlsx",
        );

        assert!(msg.contains("Cc: boss@x.com, hr@x.com\r\n"));
        assert!(msg.contains("Content-Disposition: attachment; filename=\"timecard_Ada_2025-01-10.xlsx\"\r\n"));
        assert!(msg.contains(&format!("Content-Type: {XLSX_CONTENT_TYPE}\r\n")));
        assert!(msg.ends_with("\r\n\r\n--==BOUNDARY==--\r\n"));

        let encoded = STANDARD.encode(&attachment);
        let start = msg.find("base64\r\n\r\n").unwrap() + "base64\r\n\r\n".len();
        let lines: Vec<&str> = msg[start..].split("\r\n").take_while(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 76);
        assert_eq!(lines.concat(), encoded);
    }

    #[test]
    fn envelope_requires_sender_and_recipients() {
        assert!(matches!(Envelope::new("", addrs(&["a@x.com"])), Err(MailError::NoSender)));
        assert!(matches!(Envelope::new("me@x.com", vec![]), Err(MailError::NoRecipients)));
        let envelope = Envelope::new("me@x.com", addrs(&["a@x.com"])).unwrap();
        assert_eq!(envelope.recipients, addrs(&["a@x.com"]));
    }

    fn smtp() -> SmtpSettings {
        SmtpSettings {
            host: Some("smtp.example.com".into()),
            port: Some(587),
            user: Some("mailer@example.com".into()),
            password: Some("secret".into()),
        }
    }

    #[test]
    fn smtp_config_needs_every_value() {
        let config = SmtpConfig::from_settings(&smtp()).unwrap();
        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 587);

        for missing in [
            SmtpSettings { host: None, ..smtp() },
            SmtpSettings { port: None, ..smtp() },
            SmtpSettings { user: None, ..smtp() },
            SmtpSettings { password: None, ..smtp() },
        ] {
            let err = SmtpConfig::from_settings(&missing).unwrap_err();
            assert!(matches!(err, MailError::NotConfigured), "{err}");
        }
    }

    #[test]
    fn no_transport_without_smtp_or_sendmail() {
        let Err(err) = mail_transport(&MailSettings::default()) else {
            panic!("transport without settings");
        };
        assert!(err.to_string().starts_with("SMTP not configured"), "{err}");
    }

    #[test]
    fn partial_smtp_settings_are_not_configured() {
        let settings = MailSettings {
            smtp: SmtpSettings {
                password: None,
                ..smtp()
            },
            ..MailSettings::default()
        };
        assert!(matches!(mail_transport(&settings), Err(MailError::NotConfigured)));
    }

    #[test]
    fn sendmail_needs_no_smtp_settings() {
        let settings = MailSettings {
            sendmail: Some("sendmail".into()),
            ..MailSettings::default()
        };
        assert!(mail_transport(&settings).is_ok());
    }

    #[test]
    fn bad_address_is_rejected() {
        let err = parse_address("not an address").unwrap_err();
        assert!(matches!(err, MailError::Address { .. }), "{err}");
        assert_eq!(parse_address("a@x.com").unwrap().to_string(), "a@x.com");
    }

    #[cfg(unix)]
    #[test]
    fn failing_sendmail_is_reported() {
        let envelope = Envelope::new("me@x.com", addrs(&["a@x.com"])).unwrap();
        let err = SendmailTransport::new("false").send(&envelope, b"Subject: x\r\n\r\n").unwrap_err();
        assert!(matches!(err, MailError::Failed { .. }), "{err}");
    }

    #[test]
    fn missing_sendmail_fails_to_spawn() {
        let envelope = Envelope::new("me@x.com", addrs(&["a@x.com"])).unwrap();
        let err = SendmailTransport::new("timecard-test-no-such-sendmail")
            .send(&envelope, b"")
            .unwrap_err();
        assert!(matches!(err, MailError::Spawn { .. }), "{err}");
    }
}
