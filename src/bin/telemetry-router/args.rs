use clap::Parser;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "MQTT_HOST", default_value = "localhost")]
    pub mqtt_host: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    #[arg(long, env = "MQTT_KEEP_ALIVE_SECS", default_value_t = 30)]
    pub mqtt_keep_alive_secs: u64,

    /// Topic root; metrics arrive on `<main topic>/<metric>`.
    #[arg(long, env = "MAIN_TOPIC", default_value = env_telemetry::router::DEFAULT_MAIN_TOPIC)]
    pub main_topic: String,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "SINK_TIMEOUT_SECS", default_value_t = 10)]
    pub sink_timeout_secs: u64,

    /// Apply pending database migrations before starting.
    #[arg(long, env = "MIGRATE")]
    pub migrate: bool,
}
