use clap::{Parser, Subcommand};
use hie_core::template::TemplateFilter;
use hie_core::xml::XmlDocument;
use hie_core::{
    core_config_from_env_values, Collaborators, CoreConfig, HealthInformationService,
    IdentifierSystem, LocalExchange,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hie")]
#[command(about = "Health information exchange document CLI")]
struct Cli {
    /// Local exchange directory
    #[arg(long, global = true, default_value = hie_core::DEFAULT_EXCHANGE_DIR)]
    exchange_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a patient's aggregated clinical documents as JSON
    Fetch {
        /// Patient MRN
        patient_id: String,
    },
    /// Publish a clinical document to the exchange
    Publish {
        /// Path to the document
        file: PathBuf,
    },
    /// Register the identifier system of a patient MRN
    RegisterPatient {
        /// Patient MRN
        patient_id: String,
        /// Assigning authority OID (bare or urn:oid: form)
        oid: String,
        /// Identifier system name
        #[arg(long, default_value = "MRN")]
        value: String,
    },
    /// Check whether a document carries the configured template id
    CheckTemplate {
        /// Path to the document
        file: PathBuf,
    },
}

fn config() -> Result<CoreConfig, Box<dyn std::error::Error>> {
    Ok(core_config_from_env_values(
        std::env::var("HIE_REPOSITORY_UNIQUE_ID").ok(),
        std::env::var("HIE_HOME_COMMUNITY_ID").ok(),
        std::env::var("HIE_TEMPLATE_ROOT").ok(),
    )?)
}

fn service(
    cfg: CoreConfig,
    exchange: LocalExchange,
) -> Result<HealthInformationService, Box<dyn std::error::Error>> {
    Ok(HealthInformationService::new(
        Arc::new(cfg),
        Collaborators::from_exchange(Arc::new(exchange)),
    )?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config()?;

    match cli.command {
        Some(Commands::Fetch { patient_id }) => {
            let exchange =
                LocalExchange::open(&cli.exchange_dir, cfg.repository_unique_id().clone())?;
            match service(cfg, exchange)?.get_patient_health_data(&patient_id) {
                Ok(aggregate) => println!("{}", aggregate.to_json()?),
                Err(e) if e.is_nothing_found() => eprintln!("No documents: {}", e),
                Err(e) => eprintln!("Error fetching health data: {}", e),
            }
        }
        Some(Commands::Publish { file }) => {
            let content = std::fs::read(&file)?;
            let exchange =
                LocalExchange::open(&cli.exchange_dir, cfg.repository_unique_id().clone())?;
            match service(cfg, exchange)?.publish_patient_health_data(&content) {
                Ok(()) => println!("Published {}", file.display()),
                Err(e) => eprintln!("Error publishing document: {}", e),
            }
        }
        Some(Commands::RegisterPatient {
            patient_id,
            oid,
            value,
        }) => {
            let exchange =
                LocalExchange::open(&cli.exchange_dir, cfg.repository_unique_id().clone())?;
            match exchange.register_patient(&patient_id, IdentifierSystem { value, oid }) {
                Ok(()) => println!("Registered patient {}", patient_id),
                Err(e) => eprintln!("Error registering patient: {}", e),
            }
        }
        Some(Commands::CheckTemplate { file }) => {
            let content = std::fs::read(&file)?;
            let document = XmlDocument::parse(&content)?;
            let filter = TemplateFilter::for_template_root(cfg.template_root().as_str())?;
            if filter.matches(&document) {
                println!("{} carries template {}", file.display(), cfg.template_root());
            } else {
                println!(
                    "{} does not carry template {}",
                    file.display(),
                    cfg.template_root()
                );
            }
        }
        None => {
            println!("Use 'hie --help' for commands");
        }
    }

    Ok(())
}
