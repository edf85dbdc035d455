use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub kafka: KafkaSettings,
    pub auth: AuthSettings,
    pub rate_limit: RateLimitSettings,
    pub idempotency: IdempotencySettings,
    pub gateway: GatewaySettings,
    pub webhook: WebhookSettings,
    pub reconciliation: ReconciliationSettings,
    pub orders: IntegrationSettings,
    pub saas: IntegrationSettings,
    pub chaos: ChaosSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub env: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaSettings {
    pub brokers: String,
    pub topic_prefix: String,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub token_expires_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    pub write_per_min: u32,
    pub read_per_min: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdempotencySettings {
    pub ttl_seconds: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewaySettings {
    pub provider: String,
    pub stripe_api_key: String,
    pub max_retries: u32,
    pub retry_base_delay_seconds: f64,
    pub retry_max_delay_seconds: f64,
    pub circuit_failure_threshold: u32,
    pub circuit_recovery_timeout_seconds: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookSettings {
    pub delivery_enabled: bool,
    pub http_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconciliationSettings {
    pub interval_minutes: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IntegrationSettings {
    pub enabled: bool,
    pub exchange: String,
    pub queue: String,
    pub routing_keys: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChaosSettings {
    pub enabled: bool,
    pub fail_percent: u8,
    pub latency_ms: u64,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}
