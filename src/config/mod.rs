pub mod toml_config;

pub use toml_config::{MonitoringSettings, OutputSettings, PipelineSettings, ProcessingSettings, TerminologySettings};

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{validate_language_tag, validate_path, Validate};
#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "clinical-etl")]
#[command(about = "Extract and normalize the clinical domains of a patient summary document")]
pub struct CliConfig {
    #[arg(long, short = 'd', help = "Clinical document (XML) to process")]
    pub document: String,

    #[arg(long, short = 'c', help = "TOML settings file")]
    pub config: Option<String>,

    #[arg(long, help = "Directory for clinical_record.json and the CSV files")]
    pub output_path: Option<String>,

    #[arg(long, help = "Display language for terminology lookups, e.g. en or pt-PT")]
    pub language: Option<String>,

    #[arg(long, help = "Session key for reusing cached sections")]
    pub session: Option<String>,

    #[arg(long, help = "Resolve codes without the terminology service")]
    pub offline: bool,

    #[arg(long, help = "Bundle all output files into one zip")]
    pub zip: bool,

    #[arg(long, short = 'v', help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,

    #[arg(long, help = "Process and print a summary without writing files")]
    pub dry_run: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 命令列參數覆蓋設定檔
    pub fn apply_to(&self, mut settings: PipelineSettings) -> PipelineSettings {
        if let Some(output_path) = &self.output_path {
            settings.output.output_path = output_path.clone();
        }
        if let Some(language) = &self.language {
            settings.terminology.language = language.clone();
        }
        if self.offline {
            settings.terminology.endpoint = None;
        }
        if self.zip {
            settings.output.zip = true;
        }
        if self.monitor {
            settings.monitoring.enabled = true;
        }
        if self.verbose {
            settings.monitoring.log_level = "debug".to_string();
        }
        settings
    }

    /// Settings file if given, else defaults, with the flags applied.
    pub fn settings(&self) -> Result<PipelineSettings> {
        let settings = match &self.config {
            Some(path) => PipelineSettings::from_file(path)?,
            None => PipelineSettings::default(),
        };
        let settings = self.apply_to(settings);
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_path("document", &self.document)?;
        if let Some(language) = &self.language {
            validate_language_tag("language", language)?;
        }
        if let Some(output_path) = &self.output_path {
            validate_path("output_path", output_path)?;
        }
        Ok(())
    }
}
