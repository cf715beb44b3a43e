use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use intake_core::{
    ConfigFile, IntakeConfig, NonEmptyText, Orchestrator, RawDemographics, RegistrationRequest,
    ResourceId, WorkflowProgress,
};
use registry_client::FhirRegistryClient;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "intake")]
#[command(about = "Patient identity resolution and visit registration")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true, env = "INTAKE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a patient for a visit: resolve or create, attach coverage, open an encounter
    Register {
        #[command(flatten)]
        demographics: DemographicArgs,
        /// Attending practitioner id
        #[arg(long)]
        provider: String,
        /// Chief complaint
        #[arg(long)]
        reason: String,
        /// Date of service (YYYY-MM-DD); enables eligibility verification
        #[arg(long)]
        service_date: Option<NaiveDate>,
        /// Progress JSON from a failed run; completed steps are not repeated
        #[arg(long)]
        resume: Option<PathBuf>,
    },
    /// Search the registry and print scored candidates
    Search {
        #[command(flatten)]
        demographics: DemographicArgs,
    },
    /// Print the resolved configuration
    Config,
}

#[derive(Args, Debug)]
struct DemographicArgs {
    /// Family name
    #[arg(long)]
    family: String,
    /// Given name
    #[arg(long)]
    given: Option<String>,
    /// Date of birth (YYYY-MM-DD)
    #[arg(long)]
    birth_date: String,
    /// male, female, other or unknown
    #[arg(long)]
    gender: Option<String>,
    #[arg(long)]
    address_line: Option<String>,
    #[arg(long)]
    city: Option<String>,
    /// Two-letter region code
    #[arg(long)]
    region: Option<String>,
    #[arg(long)]
    postal_code: Option<String>,
    #[arg(long)]
    phone_home: Option<String>,
    #[arg(long)]
    phone_work: Option<String>,
    /// Payer member identifier
    #[arg(long)]
    payer_id: Option<String>,
}

impl From<DemographicArgs> for RawDemographics {
    fn from(args: DemographicArgs) -> Self {
        RawDemographics {
            family_name: args.family,
            given_name: args.given,
            birth_date: args.birth_date,
            gender: args.gender,
            address_line: args.address_line,
            city: args.city,
            region: args.region,
            postal_code: args.postal_code,
            phone_home: args.phone_home,
            phone_work: args.phone_work,
            payer_id: args.payer_id,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("intake_core=info".parse()?)
                .add_directive("registry_client=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = ConfigFile::resolve(cli.config.as_deref(), |var| std::env::var(var).ok())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_yaml()?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Search { demographics } => {
            let orchestrator = orchestrator(config)?;
            let ranked = orchestrator.search(&demographics.into()).await?;
            if ranked.is_empty() {
                println!("No candidates found.");
            }
            for result in ranked {
                println!(
                    "{:.2}  {}  {}  MRN: {}",
                    result.score,
                    result.candidate.id,
                    result.candidate.display_name,
                    result.candidate.mrn().unwrap_or("-"),
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Register {
            demographics,
            provider,
            reason,
            service_date,
            resume,
        } => {
            let request = RegistrationRequest {
                demographics: demographics.into(),
                provider_id: ResourceId::parse(&provider).context("invalid --provider")?,
                reason: NonEmptyText::new(&reason).context("invalid --reason")?,
                service_date,
            };
            let progress = match resume {
                Some(path) => read_progress(&path)?,
                None => WorkflowProgress::default(),
            };

            let orchestrator = orchestrator(config)?;
            match orchestrator.resume(&request, progress).await {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(failure) => {
                    eprintln!("Error: {failure}");
                    if failure.is_retryable() {
                        eprintln!("Save the progress below and re-run with --resume <file>.");
                    }
                    println!("{}", serde_json::to_string_pretty(&failure.progress)?);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn orchestrator(config: IntakeConfig) -> anyhow::Result<Orchestrator<FhirRegistryClient>> {
    let client = FhirRegistryClient::new(&config).context("failed to build registry client")?;
    tracing::info!(registry = %config.registry_base_url(), "using registry");
    Ok(Orchestrator::new(Arc::new(client), Arc::new(config)))
}

fn read_progress(path: &std::path::Path) -> anyhow::Result<WorkflowProgress> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read progress file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid progress file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_arguments_map_to_raw_demographics() {
        let cli = Cli::try_parse_from([
            "intake",
            "register",
            "--family",
            "Rodriguez",
            "--given",
            "Maria",
            "--birth-date",
            "1979-03-15",
            "--payer-id",
            "IL-MCD-88123",
            "--provider",
            "dr-sarah-chen",
            "--reason",
            "Fatigue",
            "--service-date",
            "2026-01-05",
        ])
        .expect("valid arguments");

        match cli.command {
            Commands::Register {
                demographics,
                service_date,
                resume,
                ..
            } => {
                let raw: RawDemographics = demographics.into();
                assert_eq!(raw.family_name, "Rodriguez");
                assert_eq!(raw.payer_id.as_deref(), Some("IL-MCD-88123"));
                assert_eq!(service_date, NaiveDate::from_ymd_opt(2026, 1, 5));
                assert!(resume.is_none());
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn search_requires_birth_date() {
        assert!(Cli::try_parse_from(["intake", "search", "--family", "Rodriguez"]).is_err());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["intake", "config", "--config", "intake.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("intake.yaml")));
    }
}
