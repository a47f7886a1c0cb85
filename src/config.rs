use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub jwt_secret: String,
    pub smtp_relay: String,
    pub smtp_username: String,
    pub smtp_password: String,
    pub frontend_url: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "3000"),
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1/"),
            jwt_secret: read_secret("JWT_SECRET"),
            smtp_relay: try_load("SMTP_RELAY", "smtp.gmail.com"),
            smtp_username: read_secret("SMTP_USERNAME"),
            smtp_password: read_secret("SMTP_PASSWORD"),
            frontend_url: try_load("FRONTEND_URL", "https://eboook.netlify.app"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

/// Reads a secret from the environment, falling back to the Docker
/// secrets mount used in deployment.
fn read_secret(secret_name: &str) -> String {
    if let Ok(value) = env::var(secret_name) {
        return value;
    }

    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .expect("Secrets misconfigured!")
}
