use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, warn};

use super::{Email, Mailer};

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

/// Request body for the SendGrid v3 `mail/send` endpoint.
#[derive(Serialize)]
struct SendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

impl<'a> From<&'a Email> for SendRequest<'a> {
    fn from(email: &'a Email) -> Self {
        Self {
            personalizations: vec![Personalization {
                to: vec![Address { email: &email.to }],
            }],
            from: Address { email: &email.from },
            subject: &email.subject,
            content: vec![Content {
                kind: "text/plain",
                value: &email.text,
            }],
        }
    }
}

#[derive(Clone)]
pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl SendGridMailer {
    pub fn new(api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("accounts-api/0.1 (+reqwest)")
            .timeout(Duration::from_secs(30))
            .build()
            .context("build mail client")?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: SENDGRID_ENDPOINT.to_string(),
        })
    }

    pub async fn deliver(&self, email: &Email) -> anyhow::Result<()> {
        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SendRequest::from(email))
            .send()
            .await
            .context("sendgrid request")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("sendgrid returned {status}: {body}");
        }
        debug!(to = %email.to, %status, "mail accepted");
        Ok(())
    }
}

impl Mailer for SendGridMailer {
    fn dispatch(&self, email: Email) {
        let mailer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.deliver(&email).await {
                warn!(error = %e, to = %email.to, subject = %email.subject, "mail delivery failed");
            }
        });
    }
}
