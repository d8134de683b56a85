use anyhow::Context;
use clap::Parser;
use clinical_etl::app::build_resolver;
use clinical_etl::config::PipelineSettings;
use clinical_etl::domain::model::CodedValue;
use clinical_etl::terminology::code_systems;
use clinical_etl::utils::{logger, validation::Validate};

#[derive(Parser)]
#[command(name = "resolve-code")]
#[command(about = "Resolve one code through the terminology chain and show which step answered")]
struct Args {
    /// Code to resolve, e.g. 372687004
    code: String,

    /// Code system OID or alias (snomed, loinc, atc, ucum)
    #[arg(short, long, default_value = "snomed")]
    system: String,

    /// Path to TOML settings file
    #[arg(short, long)]
    config: Option<String>,

    /// Terminology endpoint, overrides the settings file
    #[arg(long)]
    endpoint: Option<String>,

    #[arg(short, long)]
    language: Option<String>,

    /// Raw display text carried by the document
    #[arg(long)]
    display: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn system_oid(system: &str) -> &str {
    match system.to_lowercase().as_str() {
        "snomed" | "snomed-ct" | "sct" => code_systems::SNOMED_CT,
        "loinc" => code_systems::LOINC,
        "atc" => code_systems::ATC,
        "ucum" => code_systems::UCUM,
        _ => system,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose);

    let mut settings = match &args.config {
        Some(path) => PipelineSettings::from_file(path)
            .with_context(|| format!("Failed to load config file '{}'", path))?,
        None => PipelineSettings::default(),
    };
    if let Some(endpoint) = &args.endpoint {
        settings.terminology.endpoint = Some(endpoint.clone());
    }
    if let Some(language) = &args.language {
        settings.terminology.language = language.clone();
    }
    settings.validate().context("Invalid settings")?;

    let resolver = build_resolver(&settings).context("Could not build the terminology resolver")?;
    let system = system_oid(&args.system);

    let mut coded = CodedValue::new(args.code.as_str(), system);
    if let Some(display) = &args.display {
        coded = coded.with_display(display.as_str());
    }

    tracing::info!("🔎 Resolving {}|{}", system, args.code);
    let resolution = resolver.resolve_coded(&coded, None).await;

    println!("code:     {}", args.code);
    println!("system:   {} ({})", system, code_systems::fhir_system_uri(system));
    println!("language: {}", resolver.language());
    println!("display:  {}", resolution.display);
    println!("source:   {}", resolution.source.as_str());
    if let Some(entry) = resolver.cached_entry(&args.code, system, None).await {
        println!(
            "cached:   {} at {}",
            entry.resolved_display.as_deref().unwrap_or("(no match)"),
            entry.fetched_at.to_rfc3339()
        );
    }

    let stats = resolver.cache_stats().await;
    tracing::debug!("📊 Cache: {:?}", stats);
    Ok(())
}
