use crate::config::MonitoringSettings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins over the configured level.
fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("clinical_etl={},warn", level.to_lowercase())))
}

pub fn init_cli_logger(verbose: bool) {
    init_logger(&MonitoringSettings {
        log_level: if verbose { "debug" } else { "info" }.to_string(),
        ..MonitoringSettings::default()
    });
}

/// 依設定初始化日誌；`json_logs` 供集中式日誌系統解析
pub fn init_logger(settings: &MonitoringSettings) {
    let filter = filter_for(&settings.log_level);
    let registry = tracing_subscriber::registry().with(filter);

    let result = if settings.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    };

    // 重複初始化時保留既有的 subscriber
    if result.is_err() {
        tracing::debug!("Logger already initialized");
    }
}
