use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::utils::app_config::SmtpSettings;

pub const BACKUP_BODY: &str = "Attached is the budget archive backup.";

pub fn backup_subject(date: NaiveDate) -> String {
    format!("Budget Archive Backup - {}", date.format("%Y-%m-%d"))
}

/// Build the backup mail with the zip at `zip_path` attached
pub fn build_backup_message(
    settings: &SmtpSettings,
    zip_path: &Path,
    date: NaiveDate,
) -> Result<Message> {
    let contents = fs::read(zip_path).with_context(|| format!("reading {}", zip_path.display()))?;
    let file_name = zip_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup.zip".to_string());

    let attachment =
        Attachment::new(file_name).body(contents, ContentType::parse("application/octet-stream")?);

    let message = Message::builder()
        .from(settings.address.parse()?)
        .to(settings.recipient.parse()?)
        .subject(backup_subject(date))
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(BACKUP_BODY.to_string()))
                .singlepart(attachment),
        )?;
    Ok(message)
}

/// Send the message over STARTTLS with the configured login
pub async fn send_backup(settings: &SmtpSettings, message: Message) -> Result<()> {
    let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)?
        .port(settings.port)
        .credentials(Credentials::new(
            settings.address.clone(),
            settings.password.clone(),
        ))
        .build();

    transport.send(message).await?;
    tracing::info!(to = %settings.recipient, "backup email sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            address: "budget@example.com".to_string(),
            password: "pw".to_string(),
            recipient: "owner@example.com".to_string(),
            server: "smtp.example.com".to_string(),
            port: 587,
        }
    }

    #[test]
    fn test_subject() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert_eq!(backup_subject(date), "Budget Archive Backup - 2026-10-17");
    }

    #[test]
    fn test_message_carries_attachment() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("actual-budget-20261017.zip");
        fs::write(&zip_path, b"PK\x05\x06").unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let message = build_backup_message(&settings(), &zip_path, date).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();

        assert!(raw.contains("Subject: Budget Archive Backup - 2026-10-17"));
        assert!(raw.contains("From: budget@example.com"));
        assert!(raw.contains("To: owner@example.com"));
        assert!(raw.contains(BACKUP_BODY));
        assert!(raw.contains("actual-budget-20261017.zip"));
        assert!(raw.contains("application/octet-stream"));
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("b.zip");
        fs::write(&zip_path, b"x").unwrap();

        let mut bad = settings();
        bad.recipient = "not an address".to_string();
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        assert!(build_backup_message(&bad, &zip_path, date).is_err());
    }
}
