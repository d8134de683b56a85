use clap::Parser;
use clinical_etl::utils::error::{ClinicalError, ErrorSeverity};
use clinical_etl::utils::{logger, validation::Validate};
use clinical_etl::{app, CliConfig};

fn report(e: &ClinicalError) -> i32 {
    tracing::error!(
        "❌ Processing failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 驗證配置
    let settings = match cli.validate().and_then(|_| cli.settings()) {
        Ok(settings) => settings,
        Err(e) => {
            logger::init_cli_logger(cli.verbose);
            tracing::error!("❌ Configuration validation failed: {}", e);
            std::process::exit(report(&e).max(1));
        }
    };

    // 初始化日誌
    logger::init_logger(&settings.monitoring);

    tracing::info!("Starting clinical-etl CLI");
    tracing::debug!("CLI config: {:?}", cli);
    if settings.monitoring.enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let document = match tokio::fs::read_to_string(&cli.document).await {
        Ok(text) => text,
        Err(e) => std::process::exit(report(&ClinicalError::IoError(e)).max(1)),
    };

    match app::run_document(&settings, &document, cli.session.as_deref(), cli.dry_run).await {
        Ok(outcome) => {
            for result in outcome.record.values() {
                let meta = &result.metadata;
                match &meta.error {
                    Some(error) => println!("⚠️ {} ({}): {}", meta.domain_name, meta.domain_code, error),
                    None => println!(
                        "📋 {} ({}): {} items{}",
                        meta.domain_name,
                        meta.domain_code,
                        meta.item_count,
                        if meta.skipped_items > 0 {
                            format!(", {} skipped", meta.skipped_items)
                        } else {
                            String::new()
                        }
                    ),
                }
            }
            tracing::info!("✅ Document processed successfully!");
            for path in &outcome.written {
                println!("📁 {}/{}", settings.output.output_path, path);
            }
        }
        Err(e) => {
            let exit_code = report(&e);
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
