use gateway::config::Config as GatewayConfig;
use serde::Deserialize;
use std::fs::File;

#[derive(Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data: Config = serde_yaml::from_reader(file)?;
        data.gateway.validate()?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] gateway::config::ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway::config::CacheConfig;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn gateway_config() {
        let yaml = r#"
            metrics:
                statsd_host: "127.0.0.1"
                statsd_port: 8125
            gateway:
                listener:
                    host: 0.0.0.0
                    port: 3000
                data_service:
                    url: "http://data.internal:8000"
                    prefix: /api/v1
                payment_service:
                    url: "http://payments.internal:8000"
                    prefix: /api/v1
                cache:
                    type: redis
                    url: "redis://127.0.0.1:6379"
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.gateway.data_service.prefix, "/api/v1");
        assert_eq!(
            config.gateway.cache,
            CacheConfig::Redis {
                url: "redis://127.0.0.1:6379".into()
            }
        );
        let metrics = config.common.metrics.expect("metrics config");
        assert_eq!(metrics.statsd_port, 8125);
        assert!(config.common.logging.is_none());
    }

    #[test]
    fn invalid_gateway_config_is_rejected() {
        let yaml = r#"
            gateway:
                data_service:
                    url: "http://data.internal:8000"
                    prefix: api
                payment_service:
                    url: "http://payments.internal:8000"
                cache:
                    type: memory
            "#;
        let tmp = write_tmp_file(yaml);
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
