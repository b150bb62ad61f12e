use crate::backup::function_path;
use crate::backup::notifications::Notification;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::validate::validate_inner;
use bon::Builder;
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use validator::Validate;

/// SMTP relay used for failure e-mails.
///
/// The password is kept in a [`RedactedString`] so it never shows up in logs
/// or re-serialized config.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct SmtpNotificationConfig {
    #[validate(length(min = 1))]
    #[builder(into)]
    host: String,
    #[builder(into)]
    smtp_mode: SmtpMode,
    #[builder(into)]
    from: Mailbox,
    #[builder(into)]
    username: String,
    #[validate(custom(function = validate_inner))]
    #[builder(into)]
    password: RedactedString,
}

/// SMTP connection security modes
///
/// - `Unsecured`: plain text, for local relays and tests
/// - `Ssl`: TLS from the start
/// - `StartTls`: plain text upgraded to TLS
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SmtpMode {
    Unsecured,
    Ssl,
    StartTls,
}

impl Notification for SmtpNotificationConfig {
    #[named]
    fn send<D1: Display, D2: Display>(&self, to: &Mailbox, topic: D1, msg: D2) -> Result<()> {
        tracing::info!(
            "Started smtp email notification from {:?} to {:?}",
            self.from,
            to
        );
        let email = Message::builder()
            .to(to.clone())
            .from(self.from.clone())
            .subject(format!("{}", topic))
            .header(ContentType::TEXT_PLAIN)
            .body(format!("{}", msg))
            .map_err(Error::from)
            .add_msg(format!(
                "Fail to build notification email from {:?} to {:?}",
                self.from, to
            ))
            .add_fn_name(function_path!())?;

        let creds = Credentials::new(self.username.clone(), self.password.inner().to_string());

        let mailer = match self.smtp_mode {
            SmtpMode::Unsecured => Ok(SmtpTransport::builder_dangerous(self.host.as_str())),
            SmtpMode::Ssl => SmtpTransport::relay(self.host.as_str()),
            SmtpMode::StartTls => SmtpTransport::starttls_relay(self.host.as_str()),
        }
        .map_err(Error::from)
        .add_msg(format!(
            "Failed to build smtp client for host: {:?} with mode {:?}",
            self.host, self.smtp_mode
        ))
        .add_fn_name(function_path!())?
        .credentials(creds)
        .build();

        tracing::info!("Sending email...");
        let response = mailer
            .send(&email)
            .map_err(Error::from)
            .add_fn_name(function_path!())?;
        if response.is_positive() {
            Ok(())
        } else {
            let mut error_vec = response
                .message()
                .map(|m| Error::smtp_send_error(m.to_owned()))
                .collect_vec();
            if error_vec.is_empty() {
                error_vec.push(Error::smtp_send_error(format!("code {}", response.code())));
            }
            Err(Error::from(error_vec).add_fn_name(function_path!()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: String, smtp_mode: SmtpMode) -> SmtpNotificationConfig {
        SmtpNotificationConfig::builder()
            .host(host)
            .smtp_mode(smtp_mode)
            .from("josync@example.com".parse::<Mailbox>().unwrap())
            .username("testuser")
            .password(RedactedString::builder().inner("testpass").build())
            .build()
    }

    #[test]
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    fn test_smtp_notification_send() {
        use std::env;

        // Skip if running in CI or without network
        if env::var("CI").is_ok() {
            return;
        }

        let server = maik::MockServer::builder().no_verify_credentials().build();
        let config = config(
            format!("{}:{}", server.host(), server.port()),
            SmtpMode::Unsecured,
        );

        server.start();
        std::thread::sleep(std::time::Duration::from_millis(100));

        let to = "admin@example.com".parse::<Mailbox>().unwrap();
        let result = config.send(&to, "Backup job \"laptop\" failed", "Sync tool exited with code 23");

        std::thread::sleep(std::time::Duration::from_millis(200));

        if result.is_ok() {
            let assertion = maik::MailAssertion::new()
                .recipients_are(["admin@example.com"])
                .body_is("Sync tool exited with code 23");
            assert!(server.assert(assertion));
        }
    }

    #[test]
    fn test_smtp_notification_validation() {
        let valid_config = config("smtp.example.com".to_owned(), SmtpMode::Ssl);
        assert!(valid_config.validate().is_ok());

        let empty_host = config(String::new(), SmtpMode::Ssl);
        assert!(empty_host.validate().is_err());

        let empty_password = SmtpNotificationConfig::builder()
            .host("smtp.example.com")
            .smtp_mode(SmtpMode::StartTls)
            .from("josync@example.com".parse::<Mailbox>().unwrap())
            .username("testuser")
            .password(RedactedString::builder().inner("").build())
            .build();
        assert!(empty_password.validate().is_err());
    }

    #[test]
    fn test_smtp_config_from_yaml_hides_password() {
        let config: SmtpNotificationConfig = serde_yml::from_str(
            "host: smtp.example.com\n\
             smtp_mode: StartTls\n\
             from: Josync <josync@example.com>\n\
             username: backup\n\
             password: hunter22\n",
        )
        .unwrap();

        assert_eq!(config.password().inner(), "hunter22");
        assert_eq!(config.smtp_mode(), &SmtpMode::StartTls);
        assert!(!format!("{config:?}").contains("hunter22"));
        assert!(!serde_yml::to_string(&config).unwrap().contains("hunter22"));
    }

    #[test]
    fn test_smtp_mode_serialization() {
        let modes = vec![
            (SmtpMode::Unsecured, "\"Unsecured\""),
            (SmtpMode::Ssl, "\"Ssl\""),
            (SmtpMode::StartTls, "\"StartTls\""),
        ];

        for (mode, expected) in modes {
            let serialized = serde_json::to_string(&mode).unwrap();
            assert_eq!(serialized, expected);
            let deserialized: SmtpMode = serde_json::from_str(&serialized).unwrap();
            assert_eq!(deserialized, mode);
        }
    }
}
