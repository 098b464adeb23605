use anyhow::Context;
use hubseek::cli::{Cli, Commands, ConfigAction, ModeArg};
use hubseek::config::{Config, SearchOverrides};
use hubseek::embedding::{self, EmbeddingProvider, NullEmbeddingProvider};
use hubseek::error::HubseekError;
use hubseek::llm;
use hubseek::retrieval::{HybridSearcher, SearchBackends, SearchMode, SearchRequest, SearchResponse};
use hubseek::storage::{ChunkStore, Database};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Search {
            query,
            top_k,
            namespace,
            mode,
            skip_expansion,
            skip_reranking,
            json,
        } => {
            let mut request = SearchRequest::new(query)
                .with_mode(mode.into())
                .skip_expansion(skip_expansion)
                .skip_reranking(skip_reranking);
            if let Some(top_k) = top_k {
                request = request.with_top_k(top_k);
            }
            if let Some(namespace) = namespace {
                request = request.with_namespace(namespace);
            }
            cmd_search(cli.config, cli.db, mode, &request, json).await?;
        }
        Commands::Show { chunk_id, json } => {
            cmd_show(cli.config, cli.db, chunk_id, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.db, action)?;
        }
    }

    Ok(())
}

/// Logs go to stderr so `--json` output stays parseable
fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "hubseek=debug" } else { "hubseek=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(config_path: Option<PathBuf>, db: Option<PathBuf>) -> hubseek::Result<Config> {
    let overrides = SearchOverrides {
        db_path: db,
        ..SearchOverrides::default()
    };
    Config::resolve(config_path.as_deref(), &overrides)
}

async fn cmd_search(
    config_path: Option<PathBuf>,
    db: Option<PathBuf>,
    mode: ModeArg,
    request: &SearchRequest,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path, db)?;
    let database = Arc::new(
        Database::new(&config.index.db_path)
            .with_context(|| format!("Failed to open index at {:?}", config.index.db_path))?,
    );

    // bm25-only never embeds, so skip loading the model
    let embedder: Arc<dyn EmbeddingProvider> = if SearchMode::from(mode) == SearchMode::Bm25Only {
        Arc::new(NullEmbeddingProvider)
    } else {
        match embedding::from_config(&config.embedding) {
            Ok(provider) => provider,
            Err(e) => {
                tracing::warn!("Vector search disabled: {}", e);
                Arc::new(NullEmbeddingProvider)
            }
        }
    };

    let cache = database.llm_cache(Duration::from_secs(config.llm.cache_ttl_secs));
    let llm = llm::from_config(&config.llm, Some(cache)).context("Failed to set up LLM client")?;

    let searcher = HybridSearcher::new(
        SearchBackends::from_database(database, embedder, llm),
        config.search.clone(),
    );
    let response = searcher.search(request).await?;

    if json {
        let out = serde_json::to_string_pretty(&response).map_err(|e| HubseekError::Json {
            source: e,
            context: "Failed to serialize search response".to_string(),
        })?;
        println!("{}", out);
    } else {
        print_response(&response);
    }

    for warning in &response.warnings {
        eprintln!("warning: {}", warning);
    }

    Ok(())
}

fn print_response(response: &SearchResponse) {
    if response.is_empty() {
        println!("No results.");
    }

    for (i, result) in response.results.iter().enumerate() {
        println!("{}. {}  [{:.4}]", i + 1, result.location(), result.final_score);
        if !result.heading_path.is_empty() {
            println!("   {}", result.heading_path);
        }

        let mut scores = Vec::new();
        if let Some(rrf) = result.rrf_score {
            scores.push(format!("rrf {:.4}", rrf));
        } else {
            scores.push(format!("lex {:.3}", result.lex_norm));
            scores.push(format!("vec {:.3}", result.vec_norm));
        }
        if let Some(rerank) = result.reranker_score {
            scores.push(format!("rerank {:.3}", rerank));
        }
        println!("   {} | {}", result.namespace_name, scores.join(", "));
        println!("   {}", result.snippet.replace('\n', " "));
        println!();
    }

    println!(
        "{} result(s) from {} candidate(s), mode {}, {} ms",
        response.results.len(),
        response.total_candidates,
        response.search_mode,
        response.duration_ms
    );

    if let Some(queries) = &response.expanded_queries {
        println!("Expanded queries: {}", queries.join(" | "));
    }
    if let Some(stages) = &response.pipeline_stages {
        println!("Pipeline:");
        for stage in stages {
            match (stage.skipped, stage.skip_reason) {
                (true, Some(reason)) => println!(
                    "  {:<24} {:>5} ms  skipped ({})",
                    stage.name.as_str(),
                    stage.duration_ms,
                    reason
                ),
                _ => println!("  {:<24} {:>5} ms", stage.name.as_str(), stage.duration_ms),
            }
        }
    }
}

fn cmd_show(
    config_path: Option<PathBuf>,
    db: Option<PathBuf>,
    chunk_id: i64,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path, db)?;
    let database = Database::new(&config.index.db_path)?;

    let chunk = database
        .fetch_enrichment(chunk_id)?
        .ok_or(HubseekError::ChunkNotFound { id: chunk_id })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chunk)?);
    } else {
        println!("{}:{}-{}", chunk.doc_path, chunk.start_line, chunk.end_line);
        if !chunk.title.is_empty() {
            println!("Title:     {}", chunk.title);
        }
        if !chunk.heading_path.is_empty() {
            println!("Heading:   {}", chunk.heading_path);
        }
        println!("Namespace: {}", chunk.namespace_name);
        println!();
        println!("{}", chunk.text);
    }

    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    db: Option<PathBuf>,
    action: ConfigAction,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, db)?;
            print!("{}", toml::to_string_pretty(&config)?);
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

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };
            println!("{}", path.display());
        }
    }

    Ok(())
}
