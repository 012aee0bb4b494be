use std::sync::Arc;

use anyhow::Context;

use crate::config::AppConfig;
use crate::emails::{DisabledMailer, Mailer, SendGridMailer};
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        let mailer = match config.mail.api_key.as_deref() {
            Some(key) => Arc::new(SendGridMailer::new(key)?) as Arc<dyn Mailer>,
            None => {
                tracing::warn!("SENDGRID_API_KEY not set; emails will not be delivered");
                Arc::new(DisabledMailer) as Arc<dyn Mailer>
            }
        };

        Ok(Self::from_parts(
            config,
            Arc::new(PgUserStore::new(db)),
            mailer,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config,
            users,
            mailer,
        }
    }

    #[cfg(test)]
    pub fn fake_with_config(config: AppConfig) -> Self {
        use crate::users::memory::MemoryUserStore;

        Self::from_parts(
            Arc::new(config),
            Arc::new(MemoryUserStore::default()),
            Arc::new(DisabledMailer),
        )
    }
}
