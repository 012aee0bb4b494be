mod sendgrid;

pub use sendgrid::SendGridMailer;

use tracing::info;

/// A plain-text transactional email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Fire-and-forget mail delivery. `dispatch` returns immediately; delivery
/// outcome is never reported to the caller.
pub trait Mailer: Send + Sync {
    fn dispatch(&self, email: Email);
}

/// Used when no provider key is configured.
pub struct DisabledMailer;

impl Mailer for DisabledMailer {
    fn dispatch(&self, email: Email) {
        info!(
            to = %email.to,
            subject = %email.subject,
            "mail delivery disabled; dropping message"
        );
    }
}

pub fn welcome(from: &str, to: &str, name: &str) -> Email {
    Email {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Thanks for joining in!".into(),
        text: format!(
            "Welcome to the app, {name}. Let me know how you get along with the app."
        ),
    }
}

pub fn cancellation(from: &str, to: &str, name: &str) -> Email {
    Email {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Tell us why you want to leave!".into(),
        text: format!("Goodbye, {name}. I hope to see you back sometime soon."),
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::{Email, Mailer};

    /// Records every dispatched message.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<Email>>,
    }

    impl RecordingMailer {
        pub fn sent(&self) -> Vec<Email> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Mailer for RecordingMailer {
        fn dispatch(&self, email: Email) {
            self.sent.lock().unwrap().push(email);
        }
    }
}
