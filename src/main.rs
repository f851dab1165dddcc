use anyhow::Result;
use arxiv_oai_harvester::config::{find_config_file, load_config};
use arxiv_oai_harvester::display::{format_page_summary, format_record};
use arxiv_oai_harvester::{ArxivOaiHarvester, GetRecordRequest, ListRecordsRequest, ListRecordsResponse};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// arXiv OAI Harvester - Fetch arXiv metadata records over OAI-PMH
#[derive(Parser, Debug)]
#[command(name = "arxiv-oai-harvester")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch arXiv metadata records over OAI-PMH", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Plain)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Repository base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// User-Agent header to send
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// Contact email sent in the From header
    #[arg(long, global = true)]
    email: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for records
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Human-readable text
    Plain,
    /// JSON (one record per line for listings)
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a single record by arXiv identifier
    #[command(alias = "g")]
    Get {
        /// Identifier, with or without the oai:arXiv.org: prefix
        identifier: String,
    },

    /// List records in a datestamp range, following resumption tokens
    #[command(alias = "l")]
    List {
        /// Lower datestamp bound (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Upper datestamp bound (YYYY-MM-DD)
        #[arg(long)]
        until: Option<NaiveDate>,

        /// Restrict to a set, e.g. physics:hep-ph
        #[arg(long)]
        set: Option<String>,

        /// Stop after this many pages
        #[arg(long)]
        max_pages: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("arxiv_oai_harvester={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration from file if specified or found in default locations
    let config_path = cli.config.clone().or_else(find_config_file);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }
    let mut config = load_config(config_path.as_deref())?;

    if let Some(base_url) = cli.base_url.clone() {
        config.base_url = base_url;
    }
    if let Some(user_agent) = cli.user_agent.clone() {
        config.user_agent = Some(user_agent);
    }
    if let Some(email) = cli.email.clone() {
        config.from = Some(email);
    }

    let mut harvester = ArxivOaiHarvester::from_config(&config)?;

    // Ctrl-C interrupts any wait in progress
    let cancel = harvester.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling pending waits");
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::Get { identifier } => {
            let request = GetRecordRequest::new(&identifier)?;
            let response = harvester.get_record(&request).await?;

            match cli.output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
                OutputFormat::Plain => match &response.record {
                    Some(record) => print!("{}", format_record(record)),
                    None => println!("No record found for {}", request.identifier()),
                },
            }
        }
        Commands::List {
            from,
            until,
            set,
            max_pages,
        } => {
            let request = ListRecordsRequest::new(from, until, set)?;

            let mut page_number = 1;
            let mut page = harvester.list_records(&request).await?;
            loop {
                output_page(page_number, &page, cli.output)?;

                if max_pages.is_some_and(|max| page_number >= max) {
                    tracing::info!("Stopping after {} pages", page_number);
                    break;
                }
                match page.resumption() {
                    Some(next) => {
                        page = harvester.resume_list_records(&next).await?;
                        page_number += 1;
                    }
                    None => break,
                }
            }
        }
    }

    Ok(())
}

fn output_page(page_number: usize, page: &ListRecordsResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            for record in &page.records {
                println!("{}", serde_json::to_string(record)?);
            }
        }
        OutputFormat::Plain => {
            for record in &page.records {
                println!("{}", format_record(record));
            }
            tracing::info!("{}", format_page_summary(page_number, page));
        }
    }
    Ok(())
}
