//! Transactional email. Delivery mechanics are an external concern; the
//! mailer renders the message and hands it to the structured logging layer,
//! which is where a real SMTP relay would be wired in.

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Mailer {
    from_name: String,
    from_address: String,
    frontend_url: String,
}

impl Mailer {
    pub fn from_env() -> Self {
        Self {
            from_name: std::env::var("EMAIL_FROM_NAME")
                .unwrap_or_else(|_| "RippleWorks".to_string()),
            from_address: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "no-reply@rippleworks.com".to_string()),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
        }
    }

    pub fn send(&self, message: &EmailMessage) {
        tracing::info!(
            to = %message.to,
            from = format!("{} <{}>", self.from_name, self.from_address),
            subject = %message.subject,
            body = %message.text,
            has_html = message.html.is_some(),
            "outbound email"
        );
    }

    pub fn send_verification_email(&self, to: &str, first_name: Option<&str>, token: &str) {
        let name = first_name.unwrap_or("there");
        let verification_url = format!("{}/verify-email?token={}", self.frontend_url, token);
        let text = format!(
            "Welcome to RippleWorks, {name}!\n\n\
             Thank you for creating your account. To complete your registration, \
             please verify your email address by clicking the link below:\n\n\
             {verification_url}\n\n\
             This link will expire in 24 hours.\n\n\
             If you didn't create this account, please ignore this email.\n\n\
             Best regards,\nThe RippleWorks Team"
        );
        self.send(&EmailMessage {
            to: to.to_string(),
            subject: "Welcome to RippleWorks - Please verify your email".to_string(),
            text,
            html: None,
        });
    }

    pub fn send_password_reset_email(&self, to: &str, first_name: Option<&str>, token: &str) {
        let name = first_name.unwrap_or("there");
        let reset_url = format!("{}/reset-password?token={}", self.frontend_url, token);
        let text = format!(
            "Hi {name},\n\n\
             You recently requested to reset your password for your RippleWorks \
             account. Click the link below to reset it:\n\n\
             {reset_url}\n\n\
             This link will expire in 1 hour for security purposes.\n\n\
             If you didn't request a password reset, please ignore this email.\n\n\
             Best regards,\nThe RippleWorks Team"
        );
        self.send(&EmailMessage {
            to: to.to_string(),
            subject: "Reset your RippleWorks password".to_string(),
            text,
            html: None,
        });
    }
}
