//! Subcommand dispatch / wiring.
//!
//! `src/main.rs` stays thin: logging init and argument parsing only, with
//! engine construction and command handling split out here.

use crate::cache::{L1Cache, ObjectCacheAdapter};
use crate::circuit::CircuitBreaker;
use crate::cli::{Cli, Command, ExitCode};
use crate::config::EngineConfig;
use crate::events::create_event_bus;
use crate::fetcher::TieredFetcher;
use crate::migration::{MigrationEngine, ThrottleConfig};
use crate::providers::google_books::GoogleBooksProvider;
use crate::providers::open_library::OpenLibraryProvider;
use crate::providers::ProviderAdapter;
use crate::scheduler::Scheduler;
use crate::search::SearchEngine;
use crate::store::{PostgresStore, RelationalStore};
use anyhow::{Context, Result};
use log::info;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn build_object_store(config: &EngineConfig) -> Result<Arc<dyn ObjectStore>> {
    if let Some(dir) = &config.cache_local_directory {
        std::fs::create_dir_all(dir).with_context(|| format!("creating cache directory {dir:?}"))?;
        let fs = LocalFileSystem::new_with_prefix(dir)
            .with_context(|| format!("initialising local object store at {dir:?}"))?;
        Ok(Arc::new(fs))
    } else {
        info!("no cache.local.directory configured; using an in-process object store");
        Ok(Arc::new(InMemory::new()))
    }
}

async fn build_store(config: &EngineConfig) -> Result<Option<Arc<dyn RelationalStore>>> {
    if !config.feature.database_enabled {
        return Ok(None);
    }
    let Some(url) = &config.database_url else {
        info!("feature.database.enabled is true but no database_url configured; running without a relational tier");
        return Ok(None);
    };
    let store = PostgresStore::connect(url).await.context("connecting to relational store")?;
    Ok(Some(Arc::new(store) as Arc<dyn RelationalStore>))
}

fn build_providers(config: &EngineConfig) -> Result<(Arc<dyn ProviderAdapter>, Arc<dyn ProviderAdapter>)> {
    let primary = Arc::new(GoogleBooksProvider::new(config.provider_api_key.clone())?) as Arc<dyn ProviderAdapter>;
    let secondary = Arc::new(OpenLibraryProvider::new()?) as Arc<dyn ProviderAdapter>;
    Ok((primary, secondary))
}

pub struct Engine {
    pub fetcher: Arc<TieredFetcher>,
    pub search: Arc<SearchEngine>,
    pub store: Option<Arc<dyn RelationalStore>>,
    pub object_cache: Arc<ObjectCacheAdapter>,
    pub scheduler: Scheduler,
}

async fn build_engine(config: EngineConfig) -> Result<Engine> {
    let object_store = build_object_store(&config)?;
    let object_cache = Arc::new(ObjectCacheAdapter::new(
        object_store,
        config.retry_s3.clone(),
        config.write_back_policy,
    ));
    let store = build_store(&config).await?;
    let (primary, secondary) = build_providers(&config)?;
    let circuit = Arc::new(CircuitBreaker::new(config.circuit.clone()));
    let l1 = L1Cache::default();
    let events = create_event_bus();

    let fetcher = Arc::new(TieredFetcher::new(
        l1.clone(),
        store.clone(),
        Some(object_cache.clone()),
        primary.clone(),
        secondary.clone(),
        circuit.clone(),
        config.clone(),
    ));

    let search = Arc::new(SearchEngine::new(
        fetcher.clone(),
        store.clone(),
        primary.clone(),
        secondary.clone(),
        circuit.clone(),
        events,
    ));

    let scheduler = Scheduler::start(
        l1,
        store.clone(),
        vec![primary, secondary],
        config.search_view_refresh_interval(),
        std::time::Duration::from_secs(6 * 60 * 60),
    );

    Ok(Engine {
        fetcher,
        search,
        store,
        object_cache,
        scheduler,
    })
}

/// Run the engine CLI with already-parsed arguments.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    info!("Starting bookcache-engine...");
    let config = EngineConfig::load(cli.config.as_ref()).context("loading configuration")?;

    let exit_code = match cli.command {
        Command::GetBook { identifier } => {
            let engine = build_engine(config).await?;
            let code = match engine.fetcher.get_book(&identifier).await {
                Ok(book) => {
                    println!("{}", serde_json::to_string_pretty(&book)?);
                    ExitCode::Success
                }
                Err(crate::error::EngineError::NotFound) => {
                    println!("not found");
                    ExitCode::Success
                }
                Err(e) => {
                    eprintln!("service unavailable: {e}");
                    ExitCode::PartialFailure
                }
            };
            engine.scheduler.shutdown().await;
            code
        }

        Command::SearchBooks {
            query,
            lang,
            limit,
            bypass_external: _,
        } => {
            let engine = build_engine(config).await?;
            let response = engine.search.search(&query, limit, lang.as_deref()).await;
            println!("queryHash={} hasMore={}", response.query_hash, response.has_more);
            for book in &response.cached_books {
                println!("{}", serde_json::to_string(book)?);
            }
            engine.scheduler.shutdown().await;
            ExitCode::Success
        }

        Command::RefreshSearchView { force } => {
            let engine = build_engine(config).await?;
            let code = if let Some(store) = &engine.store {
                if force {
                    match store.refresh_search_view().await {
                        Ok(()) => ExitCode::Success,
                        Err(e) => {
                            eprintln!("refresh failed: {e}");
                            ExitCode::PartialFailure
                        }
                    }
                } else {
                    info!("refresh-search-view without --force relies on the scheduler's debounce loop");
                    ExitCode::Success
                }
            } else {
                eprintln!("no relational store configured");
                ExitCode::ConfigError
            };
            engine.scheduler.shutdown().await;
            code
        }

        Command::MigrateBooks {
            prefix,
            max,
            skip,
            dry_run,
        } => {
            let engine = build_engine(config).await?;
            let Some(store) = engine.store.clone() else {
                eprintln!("migrate-books requires a relational store");
                engine.scheduler.shutdown().await;
                return Ok(ExitCode::ConfigError);
            };
            let migration = MigrationEngine::new(engine.object_cache.clone(), store, ThrottleConfig::default());
            let cancellation = CancellationToken::new();
            let summary = migration.consolidate(&prefix, dry_run, skip, max, &cancellation).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            let code = if summary.errors.is_empty() {
                ExitCode::Success
            } else {
                ExitCode::PartialFailure
            };
            engine.scheduler.shutdown().await;
            code
        }

        Command::MigrateLists {
            provider,
            prefix,
            max,
            skip,
        } => {
            let engine = build_engine(config).await?;
            let Some(store) = engine.store.clone() else {
                eprintln!("migrate-lists requires a relational store");
                engine.scheduler.shutdown().await;
                return Ok(ExitCode::ConfigError);
            };
            let migration = MigrationEngine::new(engine.object_cache.clone(), store, ThrottleConfig::default());
            let cancellation = CancellationToken::new();
            let list_prefix = format!("{prefix}{provider}/");
            let summary = migration.consolidate(&list_prefix, false, skip, max, &cancellation).await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            let code = if summary.errors.is_empty() {
                ExitCode::Success
            } else {
                ExitCode::PartialFailure
            };
            engine.scheduler.shutdown().await;
            code
        }

        Command::CleanupCovers {
            prefix,
            batch,
            quarantine,
            dry_run,
        } => {
            info!(
                "cleanup-covers is a thin CLI wrapper: scanning {prefix} in batches of {batch}, quarantining to {quarantine} (dry_run={dry_run})"
            );
            // Cover-image validity checking is out of scope for this engine;
            // this subcommand only rounds out the CLI surface and currently
            // performs no action.
            ExitCode::Success
        }
    };

    Ok(exit_code)
}
