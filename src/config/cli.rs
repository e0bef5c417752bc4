use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TemplateFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "stack-synth")]
#[command(about = "Synthesize the Fargate analytics stack into a deployable template")]
pub struct CliConfig {
    /// Path to TOML stack configuration (built-in defaults when omitted)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output directory for the cloud assembly
    #[arg(short, long, default_value = "cdk.out")]
    pub out: String,

    /// Template format
    #[arg(long, value_enum, default_value_t = TemplateFormat::Json)]
    pub format: TemplateFormat,

    /// Override the region from config
    #[arg(long)]
    pub region: Option<String>,

    /// Do not fingerprint image build contexts
    #[arg(long)]
    pub skip_assets: bool,

    /// Build and validate the graph, print a summary, write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = CliConfig::parse_from(["stack-synth"]);
        assert_eq!(cli.out, "cdk.out");
        assert_eq!(cli.format, TemplateFormat::Json);
        assert!(cli.config.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_flags() {
        let cli = CliConfig::parse_from([
            "stack-synth",
            "--config",
            "stack.toml",
            "--format",
            "yaml",
            "--region",
            "eu-west-1",
            "--skip-assets",
        ]);
        assert_eq!(cli.config.as_deref(), Some("stack.toml"));
        assert_eq!(cli.format, TemplateFormat::Yaml);
        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
        assert!(cli.skip_assets);
    }
}
