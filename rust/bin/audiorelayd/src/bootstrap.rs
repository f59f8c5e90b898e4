//! Startup checks run before anything binds or opens storage.

use reqwest::Url;

use crate::config::{BackendEndpoint, ServerConfig};

/// Verify server configuration is usable.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.storage.data_dir.is_empty() {
        anyhow::bail!("Storage data_dir is empty in configuration.");
    }
    verify_endpoint("local", &config.backends.local)?;
    verify_endpoint("web", &config.backends.web)?;

    let timeouts = [
        ("proxy.metadata_timeout_secs", config.proxy.metadata_timeout_secs),
        ("proxy.connect_timeout_secs", config.proxy.connect_timeout_secs),
        ("proxy.read_idle_timeout_secs", config.proxy.read_idle_timeout_secs),
        ("health.probe_timeout_secs", config.health.probe_timeout_secs),
    ];
    for (name, secs) in timeouts {
        if secs == 0 {
            anyhow::bail!("{} must be greater than zero.", name);
        }
    }
    Ok(())
}

fn verify_endpoint(name: &str, endpoint: &BackendEndpoint) -> anyhow::Result<()> {
    if endpoint.base_url.trim().is_empty() {
        anyhow::bail!("backends.{}.base_url is empty in configuration.", name);
    }
    let url = Url::parse(&endpoint.base_url)
        .map_err(|e| anyhow::anyhow!("backends.{}.base_url is invalid: {}", name, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("backends.{}.base_url must be http or https.", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendsConfig, HealthSettings, ProxySettings, StorageConfig};

    fn valid() -> ServerConfig {
        ServerConfig {
            storage: StorageConfig {
                data_dir: "/tmp".to_string(),
            },
            backends: BackendsConfig {
                local: BackendEndpoint {
                    base_url: "http://127.0.0.1:3006".to_string(),
                    token: String::new(),
                },
                web: BackendEndpoint {
                    base_url: "https://www.googleapis.com/drive/v3".to_string(),
                    token: "svc".to_string(),
                },
            },
            proxy: ProxySettings::default(),
            health: HealthSettings::default(),
        }
    }

    #[test]
    fn test_verify_config_ok() {
        assert!(verify_config(&valid()).is_ok());
    }

    #[test]
    fn test_verify_config_empty_data_dir() {
        let mut config = valid();
        config.storage.data_dir.clear();
        assert!(verify_config(&config).is_err());
    }

    #[test]
    fn test_verify_config_bad_urls() {
        let mut config = valid();
        config.backends.local.base_url = String::new();
        assert!(verify_config(&config).is_err());

        let mut config = valid();
        config.backends.web.base_url = "not a url".to_string();
        assert!(verify_config(&config).is_err());

        let mut config = valid();
        config.backends.web.base_url = "ftp://files.example.com".to_string();
        assert!(verify_config(&config).is_err());
    }

    #[test]
    fn test_verify_config_zero_timeout() {
        let mut config = valid();
        config.proxy.read_idle_timeout_secs = 0;
        assert!(verify_config(&config).is_err());

        let mut config = valid();
        config.health.probe_timeout_secs = 0;
        assert!(verify_config(&config).is_err());

        // A zero refresh interval only disables the refresher.
        let mut config = valid();
        config.health.interval_secs = 0;
        assert!(verify_config(&config).is_ok());
    }
}
