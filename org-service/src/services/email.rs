use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use service_core::error::AppError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SmtpConfig;

/// One invite in a bulk send.
#[derive(Debug, Clone, PartialEq)]
pub struct Invite {
    pub email: String,
    pub name: String,
    pub code: String,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_verification_code(&self, to_email: &str, name: &str, code: &str)
        -> Result<(), AppError>;

    async fn send_invite(&self, to_email: &str, name: &str, code: &str) -> Result<(), AppError>;

    async fn bulk_send_invite(&self, invites: &[Invite]) -> Result<(), AppError>;

    async fn send_password_reset_code(&self, to_email: &str, code: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from: Mailbox,
    reply_to: Mailbox,
}

fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, AppError> {
    let address = address
        .parse()
        .map_err(|e: lettre::address::AddressError| AppError::ConfigError(e.into()))?;
    Ok(Mailbox::new(name.map(str::to_string), address))
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let mailer = if config.user.is_empty() {
            SmtpTransport::builder_dangerous(&config.host)
                .port(config.port)
                .timeout(Some(Duration::from_secs(10)))
                .build()
        } else {
            let creds = Credentials::new(config.user.clone(), config.password.clone());
            SmtpTransport::starttls_relay(&config.host)
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e.to_string())))?
                .credentials(creds)
                .port(config.port)
                .timeout(Some(Duration::from_secs(10)))
                .build()
        };

        tracing::info!(host = %config.host, port = config.port, "Email service initialized");

        Ok(Self {
            mailer,
            from: mailbox(Some(&config.from_name), &config.from_email)?,
            reply_to: mailbox(None, &config.reply_to)?,
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from.clone())
            .reply_to(self.reply_to.clone())
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::BadRequest(e.into()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        // SmtpTransport is blocking
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }

    fn invite_bodies(name: &str, to_email: &str, code: &str) -> (String, String) {
        let plain = format!(
            "Hello {name},\n\nYou have been invited. Sign in with your email ({to_email}) and this one-time code: {code}\n\nPlease set a new password after signing in."
        );
        let html = format!(
            r#"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Hello {name}, you have been invited</h2>
        <p>Sign in with your email ({to_email}) and this one-time code:</p>
        <p style="font-size: 24px; letter-spacing: 4px;"><strong>{code}</strong></p>
        <p>Please set a new password after signing in.</p>
    </body>
</html>"#
        );
        (plain, html)
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_verification_code(
        &self,
        to_email: &str,
        name: &str,
        code: &str,
    ) -> Result<(), AppError> {
        let plain = format!("Hello {name},\n\nYour confirmation code is {code}");
        let html = format!(
            r#"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Hello {name}, please confirm your email</h2>
        <p style="font-size: 24px; letter-spacing: 4px;"><strong>{code}</strong></p>
    </body>
</html>"#
        );
        self.send_email(to_email, "Confirm your email", plain, html)
            .await
    }

    async fn send_invite(&self, to_email: &str, name: &str, code: &str) -> Result<(), AppError> {
        let (plain, html) = Self::invite_bodies(name, to_email, code);
        self.send_email(to_email, "You have been invited", plain, html)
            .await
    }

    async fn bulk_send_invite(&self, invites: &[Invite]) -> Result<(), AppError> {
        for invite in invites {
            let (plain, html) = Self::invite_bodies(&invite.name, &invite.email, &invite.code);
            self.send_email(&invite.email, "You have been invited", plain, html)
                .await?;
        }
        Ok(())
    }

    async fn send_password_reset_code(&self, to_email: &str, code: &str) -> Result<(), AppError> {
        let plain = format!("Use this code to reset your password: {code}\n\nIf you did not request a reset, ignore this email.");
        let html = format!(
            r#"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>Password reset</h2>
        <p>Use this code to reset your password:</p>
        <p style="font-size: 24px; letter-spacing: 4px;"><strong>{code}</strong></p>
        <p>If you did not request a reset, ignore this email.</p>
    </body>
</html>"#
        );
        self.send_email(to_email, "Reset your password", plain, html)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Verification,
    Invite,
    PasswordReset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub to: String,
    pub kind: EmailKind,
    pub code: String,
}

/// Records outgoing mail instead of sending it.
#[derive(Clone, Default)]
pub struct MockEmailService {
    sent: Arc<Mutex<Vec<SentEmail>>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Most recent code mailed to `to` of the given kind.
    pub fn last_code(&self, to: &str, kind: EmailKind) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|mail| mail.to == to && mail.kind == kind)
            .map(|mail| mail.code)
    }

    fn record(&self, to: &str, kind: EmailKind, code: &str) {
        let mut sent = self
            .sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sent.push(SentEmail {
            to: to.to_string(),
            kind,
            code: code.to_string(),
        });
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_verification_code(
        &self,
        to_email: &str,
        _name: &str,
        code: &str,
    ) -> Result<(), AppError> {
        self.record(to_email, EmailKind::Verification, code);
        Ok(())
    }

    async fn send_invite(&self, to_email: &str, _name: &str, code: &str) -> Result<(), AppError> {
        self.record(to_email, EmailKind::Invite, code);
        Ok(())
    }

    async fn bulk_send_invite(&self, invites: &[Invite]) -> Result<(), AppError> {
        for invite in invites {
            self.record(&invite.email, EmailKind::Invite, &invite.code);
        }
        Ok(())
    }

    async fn send_password_reset_code(&self, to_email: &str, code: &str) -> Result<(), AppError> {
        self.record(to_email, EmailKind::PasswordReset, code);
        Ok(())
    }
}
