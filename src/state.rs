use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::mail::{LogMailer, Mailer, SmtpMailer};
use crate::rate_limit::RateLimiter;
use crate::store::{DocumentStore, MemoryStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub config: Arc<AppConfig>,
    pub mailer: Arc<dyn Mailer>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let store = match &config.database_url {
            Some(url) => Arc::new(PgStore::connect(url).await?) as Arc<dyn DocumentStore>,
            None => {
                warn!("DATABASE_URL not set; using in-memory store, data is lost on restart");
                Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>
            }
        };

        let mailer = match &config.email.host {
            Some(host) => {
                info!(%host, port = config.email.port, "smtp mailer configured");
                Arc::new(SmtpMailer::new(&config.email, host)?) as Arc<dyn Mailer>
            }
            None => {
                warn!("EMAIL_HOST not set; outgoing mail is dropped");
                Arc::new(LogMailer) as Arc<dyn Mailer>
            }
        };

        Ok(Self::from_parts(store, Arc::new(config), mailer))
    }

    pub fn from_parts(store: Arc<dyn DocumentStore>, config: Arc<AppConfig>, mailer: Arc<dyn Mailer>) -> Self {
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        Self {
            store,
            config,
            mailer,
            limiter,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_mailer(Arc::new(crate::mail::RecordingMailer::default()))
    }

    #[cfg(test)]
    pub fn fake_with_mailer(mailer: Arc<crate::mail::RecordingMailer>) -> Self {
        use crate::config::{EmailConfig, Environment, JwtConfig, RateLimitConfig};

        let config = Arc::new(AppConfig {
            environment: Environment::Development,
            host: "127.0.0.1".into(),
            port: 8080,
            database_url: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 60,
                cookie_ttl_days: 90,
            },
            email: EmailConfig {
                host: None,
                port: 587,
                username: None,
                password: None,
                tls: false,
                from: "Natours <hello@natours.io>".into(),
            },
            rate_limit: RateLimitConfig {
                max_requests: 0,
                window_seconds: 3600,
                trust_proxy: false,
            },
        });

        Self::from_parts(Arc::new(MemoryStore::new()), config, mailer)
    }
}
