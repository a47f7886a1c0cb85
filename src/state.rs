use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::{
    config::Config,
    database::init_redis,
    mailer::{Mailer, SmtpMailer},
};

pub struct AppState {
    pub config: Config,
    pub redis: ConnectionManager,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let redis = init_redis(&config.redis_url).await;
        let mailer = Arc::new(SmtpMailer::new(&config).expect("SMTP misconfigured!"));

        Arc::new(Self {
            config,
            redis,
            mailer,
        })
    }
}
