use faculty_finder::cli::{Cli, Commands, ConfigAction};
use faculty_finder::config::Config;
use faculty_finder::embedding::{BuildOutcome, FastEmbedProvider, VectorIndex};
use faculty_finder::error::{FinderError, Result};
use faculty_finder::search::{details_in_order, FacultySearch, SearchQuery, WarmUp};
use faculty_finder::storage::{
    Database, FacultyDetail, FacultyStore, ScoredFaculty, SnapshotStore,
};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Build => {
            cmd_build(cli.config)?;
        }
        Commands::Search {
            query,
            limit,
            threshold,
            json,
        } => {
            cmd_search(cli.config, query, limit, threshold, json)?;
        }
        Commands::Show { id, json } => {
            cmd_show(cli.config, id, json)?;
        }
        Commands::Status => {
            cmd_status(cli.config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "faculty_finder=debug"
    } else {
        "faculty_finder=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Open the store, the embedding model and an unbuilt index
fn open_search(config: &Config) -> Result<FacultySearch> {
    let db_path = Config::expand_path(&config.storage.database_path)?;
    let index_dir = Config::expand_path(&config.storage.index_dir)?;

    let store: Arc<dyn FacultyStore> = Arc::new(Database::open(&db_path)?);

    let mut embedding = config.embedding.clone();
    if let Some(dir) = &embedding.cache_dir {
        embedding.cache_dir = Some(Config::expand_path(dir)?);
    }
    let provider = Arc::new(FastEmbedProvider::from_config(&embedding)?);

    let index = Arc::new(VectorIndex::new(
        provider,
        store.clone(),
        SnapshotStore::new(index_dir),
    ));

    Ok(FacultySearch::new(index, store, config.search.max_limit))
}

fn cmd_build(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let search = open_search(&config)?;

    match search.index().build()? {
        BuildOutcome::Built {
            records,
            duration_ms,
        } => {
            let status = search.index().status();
            println!("✓ Indexed {} faculty in {}ms", records, duration_ms);
            println!("  Model: {} ({}D)", status.model, status.dimension);
        }
        BuildOutcome::EmptyCorpus => {
            println!("No faculty with biography text to index; index unchanged");
        }
    }

    Ok(())
}

fn cmd_search(
    config_path: Option<PathBuf>,
    query: String,
    limit: Option<usize>,
    threshold: Option<f32>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;

    let query = SearchQuery::new(
        query,
        limit.unwrap_or(config.search.default_limit),
        threshold.unwrap_or(config.search.default_threshold),
    );
    // Fail on bad input before paying for model start-up
    query.validate(config.search.max_limit)?;

    let search = open_search(&config)?;
    if let WarmUp::Built(BuildOutcome::EmptyCorpus) = search.warm_up()? {
        tracing::warn!("Index is empty; no results possible");
    }

    let results = search.search(&query)?;

    if json {
        print_json(&results)?;
        return Ok(());
    }

    if results.is_empty() {
        println!("No faculty matched \"{}\"", query.text);
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        print_scored(rank + 1, result);
    }

    Ok(())
}

fn cmd_show(config_path: Option<PathBuf>, id: i64, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let db_path = Config::expand_path(&config.storage.database_path)?;
    let db = Database::open(&db_path)?;

    // Detail lookup needs no index, so skip the embedding model
    let detail = details_in_order(&db, &[id])?
        .pop()
        .ok_or(FinderError::FacultyNotFound { id })?;

    if json {
        print_json(&detail)?;
    } else {
        print_detail(&detail);
    }

    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let db_path = Config::expand_path(&config.storage.database_path)?;
    let index_dir = Config::expand_path(&config.storage.index_dir)?;

    println!("Faculty Finder Status");
    println!("=====================");

    println!("\nDatabase: {}", db_path.display());
    match Database::open(&db_path).and_then(|db| db.stats()) {
        Ok(stats) => {
            println!("  Faculty: {}", stats.faculty_count);
            println!("  With biography text: {}", stats.indexable_count);
        }
        Err(e) => println!("  Unavailable: {}", e),
    }

    println!("\nIndex: {}", index_dir.display());
    match SnapshotStore::new(index_dir).manifest() {
        Ok(Some(manifest)) => {
            println!("  Generation: {}", manifest.generation);
            println!("  Records: {}", manifest.count);
            println!("  Model: {} ({}D)", manifest.model, manifest.dimension);
            println!("  Built: {}", manifest.created_at);
            if manifest.model != config.embedding.model {
                println!(
                    "  ⚠ Configured model is {}; run `faculty-finder build`",
                    config.embedding.model
                );
            }
        }
        Ok(None) => println!("  Not built"),
        Err(e) => println!("  Unreadable: {}", e),
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let content = toml::to_string_pretty(&config)?;
            println!("{}", content);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| FinderError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'faculty-finder config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| FinderError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

fn print_scored(rank: usize, result: &ScoredFaculty) {
    let detail = &result.detail;
    println!("{}. {} [{:.3}]", rank, detail.name, result.score);
    if let Some(interests) = non_empty(&detail.research_interests) {
        println!("   Research: {}", interests);
    }
    if let Some(url) = non_empty(&detail.profile_url) {
        println!("   Profile: {}", url);
    }
    println!("   Id: {}", detail.id);
}

fn print_detail(detail: &FacultyDetail) {
    println!("{} (id {})", detail.name, detail.id);
    let fields = [
        ("Department", &detail.department),
        ("Research", &detail.research_interests),
        ("Education", &detail.education),
        ("Profile", &detail.profile_url),
        ("Image", &detail.image_url),
        ("Bio", &detail.bio),
    ];
    for (label, value) in fields {
        if let Some(value) = non_empty(value) {
            println!("  {}: {}", label, value);
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
