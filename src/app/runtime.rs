use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use super::completion::GeminiClient;
use super::data_io::{default_output_path, detect_data_format, load_catalog, write_catalog};
use super::enrich::enrich;
use super::error::{Result, ScrapeError};
use super::fetch::{DetailFetcher, HttpSource};
use super::recommend::{
    RecommendationResponse, Recommender, query_from_url, save_recommendations,
};
use super::types::{
    CatalogRecord, Cli, Command, DEFAULT_USER_AGENT, DataFormat, RecommendArgs, ScrapeArgs,
    ScrapeConfig,
};
use super::walk::CatalogWalker;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command {
        Command::Scrape(args) => run_scrape(&args).await,
        Command::Recommend(args) => run_recommend(&args).await,
    }
}

pub async fn scrape_catalog(config: &ScrapeConfig) -> Result<Vec<CatalogRecord>> {
    let source = Arc::new(HttpSource::from_config(config)?);
    let walker = CatalogWalker::new(Arc::clone(&source), config)?;
    let stubs = walker.walk().await;
    if stubs.is_empty() {
        return Err(ScrapeError::EmptyCatalog);
    }

    info!(
        count = stubs.len(),
        concurrency = config.fetch_concurrency,
        "scraped catalog listing, fetching additional details"
    );
    let fetcher = Arc::new(DetailFetcher::new(source, &config.base_url)?);
    let records = enrich(stubs, fetcher, config.fetch_concurrency).await;
    let failed = records
        .iter()
        .filter(|rec| rec.is_unretrieved())
        .count();
    if failed > 0 {
        warn!(failed, total = records.len(), "some product pages could not be retrieved");
    }
    Ok(records)
}

async fn run_scrape(args: &ScrapeArgs) -> Result<()> {
    let config = ScrapeConfig::from(args);
    let configured_format: DataFormat = args.format.into();
    let output_format = args
        .output
        .as_deref()
        .map(|path| detect_data_format(path, configured_format))
        .unwrap_or(configured_format);
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(output_format));

    let records = match scrape_catalog(&config).await {
        Ok(records) => records,
        Err(err) => {
            error!(error = %err, "no assessments found");
            return Err(err);
        }
    };
    write_catalog(&output_path, output_format, &records)?;
    info!(rows = records.len(), output = %output_path, "saved catalog dataset");

    for rec in records.iter().take(3) {
        eprintln!(
            "{} | {} | duration={} | {} | remote={} adaptive={}",
            rec.name, rec.url, rec.duration, rec.test_type, rec.remote_support, rec.adaptive_support
        );
    }
    Ok(())
}

async fn run_recommend(args: &RecommendArgs) -> Result<()> {
    let catalog = load_catalog(&args.catalog)?;
    info!(count = catalog.len(), catalog = %args.catalog, "loaded assessments");
    let timeout = Duration::from_secs(args.timeout_secs.max(1));

    let query = match (args.query.as_deref(), args.url.as_deref()) {
        (Some(query), _) if !query.trim().is_empty() => query.trim().to_string(),
        (_, Some(url)) if !url.trim().is_empty() => {
            let source = HttpSource::new(DEFAULT_USER_AGENT, timeout)?;
            query_from_url(&source, url.trim()).await.map_err(|err| {
                error!(url, error = %err, "failed to extract text from URL");
                err
            })?
        }
        _ => {
            return Err(ScrapeError::InvalidInput(
                "either --query or a valid --url must be provided".to_string(),
            ));
        }
    };

    let client = GeminiClient::new(&args.model_endpoint, &args.model, &args.api_key, timeout)?;
    let recommender = Recommender::new(client, Arc::new(catalog), args.max_results);
    let recommendations = recommender.recommend(&query).await;

    if let Some(path) = args.output.as_deref() {
        save_recommendations(path, &recommendations)?;
        info!(output = path, "saved recommendations");
    }

    let response = RecommendationResponse {
        query,
        recommended_assessments: recommendations,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
