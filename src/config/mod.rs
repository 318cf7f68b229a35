use serde::Deserialize;

static CONFIG: OnceCell<Config> = OnceCell::const_new();

mod config_dir;
pub use config_dir::{CONFIG_ENV, find_config_file, read_config, read_config_from};

mod error;
pub use error::{ConfigError, ConfigResult};
use tokio::sync::OnceCell;

#[derive(Debug, Deserialize)]
pub struct Config {
    host: Host,
    app: App,
    stripe: Stripe,
    mail: Mail,
    compensation: Compensation,
}

#[derive(Debug, Deserialize)]
pub struct Host {
    bindto: String,
    public_url: String,
}

#[derive(Debug, Deserialize)]
pub struct App {
    jwt: String,
    database_uri: String,
    #[serde(default)]
    docs: bool,
    #[serde(default = "default_request_timeout")]
    request_timeout_secs: u64,
    cron_secret: String,
    storage_key: String,
    admin_email: String,
    admin_password: String,
}

#[derive(Debug, Deserialize)]
pub struct Stripe {
    secret_key: String,
    webhook_secret: String,
    price_id: String,
    #[serde(default = "default_stripe_api_base")]
    api_base: String,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
pub struct Mail {
    from: String,
    relay_url: Option<String>,
    api_key: Option<String>,
}

/// Monthly payout rates. Amounts are minor currency units.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Compensation {
    /// Commission on contract totals in basis points (1000 = 10%).
    contract_rate_bps: i64,
    /// Flat reward per qualified referral.
    referral_reward: i64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_stripe_api_base() -> String {
    String::from("https://api.stripe.com/v1")
}

impl Config {
    #[tracing::instrument]
    pub async fn get_or_init(use_local: bool) -> &'static Config {
        CONFIG
            .get_or_init(|| async {
                let read_cfg = |use_local| -> ConfigResult<Self> {
                    let bytes = read_config(use_local)?;
                    Self::from_slice(&bytes)
                };

                match read_cfg(use_local) {
                    Ok(c) => c,
                    Err(e) => {
                        if !matches!(e, error::ConfigError::ConfigNotFound) {
                            crate::error::log_error(&e);
                        }
                        tracing::error!("Config not found or invalid.");
                        std::process::exit(1);
                    }
                }
            })
            .await
    }

    pub fn from_slice(bytes: &[u8]) -> ConfigResult<Self> {
        let config: Self = toml::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        let invalid = |key, reason| Err(ConfigError::Invalid { key, reason });

        if self.app.request_timeout_secs == 0 {
            return invalid("app.request_timeout_secs", "must be at least 1");
        }
        if self.app.admin_password.len() < crate::utils::validate::MIN_PASSWORD_LEN {
            return invalid("app.admin_password", "too short");
        }
        if self.app.cron_secret.is_empty() || self.app.storage_key.is_empty() {
            return invalid("app", "cron_secret and storage_key must be set");
        }
        if !(0..=10_000).contains(&self.compensation.contract_rate_bps) {
            return invalid("compensation.contract_rate_bps", "must be within 0..=10000");
        }
        if self.compensation.referral_reward < 0 {
            return invalid("compensation.referral_reward", "must not be negative");
        }
        Ok(())
    }

    #[inline]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[inline]
    pub fn app(&self) -> &App {
        &self.app
    }

    #[inline]
    pub fn stripe(&self) -> &Stripe {
        &self.stripe
    }

    #[inline]
    pub fn mail(&self) -> &Mail {
        &self.mail
    }

    #[inline]
    pub fn compensation(&self) -> &Compensation {
        &self.compensation
    }
}

impl Host {
    #[inline]
    pub fn bindto(&self) -> &str {
        &self.bindto
    }

    #[inline]
    pub fn public_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }
}

impl App {
    #[inline]
    pub fn jwt(&self) -> &str {
        &self.jwt
    }

    #[inline]
    pub fn database_uri(&self) -> &str {
        &self.database_uri
    }

    #[inline]
    pub fn docs(&self) -> bool {
        self.docs
    }

    #[inline]
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    #[inline]
    pub fn cron_secret(&self) -> &str {
        &self.cron_secret
    }

    #[inline]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    #[inline]
    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    #[inline]
    pub fn admin_password(&self) -> &str {
        &self.admin_password
    }
}

impl Stripe {
    #[inline]
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    #[inline]
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    #[inline]
    pub fn price_id(&self) -> &str {
        &self.price_id
    }

    #[inline]
    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }

    #[inline]
    pub fn success_url(&self) -> &str {
        &self.success_url
    }

    #[inline]
    pub fn cancel_url(&self) -> &str {
        &self.cancel_url
    }
}

impl Mail {
    #[inline]
    pub fn from(&self) -> &str {
        &self.from
    }

    #[inline]
    pub fn relay_url(&self) -> Option<&str> {
        self.relay_url.as_deref()
    }

    #[inline]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

impl Compensation {
    pub fn new(contract_rate_bps: i64, referral_reward: i64) -> Self {
        Self {
            contract_rate_bps,
            referral_reward,
        }
    }

    #[inline]
    pub fn contract_rate_bps(&self) -> i64 {
        self.contract_rate_bps
    }

    #[inline]
    pub fn referral_reward(&self) -> i64 {
        self.referral_reward
    }
}
