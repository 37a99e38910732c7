//! CLI entry point for the Stanza engine (for dev and testing).

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use stanza_core::{
    app_data_dir, load_config, load_library, save_library, scan_corpus, set_library_path, status,
    CachedProvider, Config, CorpusEntry, ItemCatalog, ItemId, ItemStore, Library, MemoryStore,
    OllamaClient, ProfileId, ProfileManager, SearchOptions, SimilarityRanker, SimilarityResult,
    VibeProfile,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stanza")]
#[command(about = "Stanza: poem and quote recommendations by vibe")]
struct Cli {
    /// Library snapshot to use instead of the configured one.
    #[arg(long, global = true, value_name = "FILE")]
    library: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status and library counts.
    Status,
    /// Show where Stanza stores its config and library (app data directory).
    DataDir,
    /// Remember FILE as the library snapshot in config.
    SetLibrary {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// Import poems/quotes from a .json/.yaml file or a directory of them.
    Import {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Add a single poem or quote; its text is embedded with Ollama.
    AddItem {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        text: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Items most similar to an item.
    Similar {
        item: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
        /// Keep the item itself in the results.
        #[arg(long)]
        include_self: bool,
        /// Ids to leave out (e.g. already shown).
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },
    /// Items most similar to free text.
    Search {
        text: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Manage vibe profiles.
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[derive(clap::Subcommand)]
enum ProfileCommand {
    /// Create a profile from seed item ids.
    Create {
        name: String,
        seeds: Vec<String>,
        /// Allow creating a profile with no resolvable seeds.
        #[arg(long)]
        allow_empty: bool,
    },
    /// Add a seed item to a profile.
    Add { profile: String, item: String },
    /// Remove a seed item (not supported; reports why).
    Remove { profile: String, item: String },
    /// Show a profile and its seed items.
    Show {
        profile: String,
        /// Print the stored profile as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List all profiles, newest first.
    List,
    /// Rename a profile.
    Rename { profile: String, name: String },
    /// Delete a profile.
    Delete { profile: String },
    /// Recommend items for a profile.
    Recommend {
        profile: String,
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
        /// Keep seed items in the results.
        #[arg(long)]
        include_seeds: bool,
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },
    /// Profile counts.
    Stats,
    /// Delete profiles with fewer than MIN seeds.
    Prune {
        #[arg(long, default_value_t = 2)]
        min: usize,
    },
    /// Recompute aggregates from current embeddings (all profiles if none given).
    Refresh { profile: Option<String> },
}

struct Engine {
    store: Arc<MemoryStore>,
    profiles: ProfileManager,
    ranker: SimilarityRanker,
    catalog: ItemCatalog,
    library_path: PathBuf,
}

impl Engine {
    async fn open(config: &Config, library_path: PathBuf) -> Result<Self, Box<dyn Error>> {
        let store = Arc::new(load_library(&library_path)?.into_store().await?);
        let provider = Arc::new(CachedProvider::new(
            OllamaClient::from_url(config.ollama_url())?.with_embed_model(config.embed_model()),
        ));
        let options = config.engine_options();
        Ok(Self {
            profiles: ProfileManager::new(store.clone(), options),
            ranker: SimilarityRanker::new(store.clone(), provider.clone(), options),
            catalog: ItemCatalog::new(store.clone(), provider, options),
            store,
            library_path,
        })
    }

    async fn save(&self) -> Result<(), Box<dyn Error>> {
        save_library(&self.library_path, &Library::snapshot(&self.store).await)?;
        tracing::debug!(path = %self.library_path.display(), "saved library");
        Ok(())
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_env("STANZA_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_deref().unwrap_or("warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config();
    init_logging(&config);

    if let Err(e) = run(cli, config).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: Config) -> Result<(), Box<dyn Error>> {
    let command = cli.command.unwrap_or(Commands::Status);
    if let Commands::DataDir = command {
        match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("Could not determine app data directory."),
        }
        return Ok(());
    }
    if let Commands::SetLibrary { path } = &command {
        set_library_path(path)?;
        println!("Library set to {}", path.display());
        return Ok(());
    }

    let library_path = cli
        .library
        .or_else(|| config.library_path())
        .ok_or("could not determine library path; pass --library")?;
    let engine = Engine::open(&config, library_path).await?;

    match command {
        Commands::DataDir | Commands::SetLibrary { .. } => {}
        Commands::Status => {
            println!("Stanza backend");
            println!("  core: {}", status());
            println!("  library: {}", engine.library_path.display());
            println!("  items: {}", engine.store.item_count().await?);
            if let Some(dim) = engine.store.dimension().await? {
                println!("  dimension: {}", dim);
            }
            let stats = engine.profiles.stats().await?;
            println!(
                "  profiles: {} ({} active, {} empty, {} seeds)",
                stats.total_profiles, stats.active, stats.empty, stats.total_seeds
            );
        }
        Commands::Import { path } => {
            let entries = scan_corpus(&path)?;
            println!("Found {} entr(ies) under {}", entries.len(), path.display());
            let report = engine.catalog.import(entries).await?;
            engine.save().await?;
            println!("Added {}, skipped {} existing", report.added, report.skipped.len());
        }
        Commands::AddItem {
            title,
            author,
            text,
            tags,
        } => {
            let item = engine
                .catalog
                .add_item(CorpusEntry {
                    id: None,
                    title,
                    author,
                    text,
                    embedding: None,
                    tags,
                })
                .await?;
            engine.save().await?;
            println!("Added {}  {} by {}", item.id, item.title, item.author);
        }
        Commands::Similar {
            item,
            limit,
            include_self,
            exclude,
        } => {
            let search = SearchOptions {
                exclude: exclude.into_iter().map(ItemId::from).collect(),
                min_similarity: None,
            };
            let results = engine
                .ranker
                .find_similar_to_item_with(&ItemId::from(item), limit, !include_self, &search)
                .await?;
            print_results(&results);
        }
        Commands::Search { text, limit } => {
            let results = engine.ranker.find_similar_to_text(&text, limit).await?;
            print_results(&results);
        }
        Commands::Profile(cmd) => run_profile(&engine, cmd).await?,
    }
    Ok(())
}

async fn run_profile(engine: &Engine, cmd: ProfileCommand) -> Result<(), Box<dyn Error>> {
    let profiles = &engine.profiles;
    match cmd {
        ProfileCommand::Create {
            name,
            seeds,
            allow_empty,
        } => {
            let seeds: Vec<ItemId> = seeds.into_iter().map(ItemId::from).collect();
            if let Some(existing) = profiles.find_profile_with_seeds(&seeds).await? {
                if !seeds.is_empty() {
                    eprintln!(
                        "Note: profile {} ({}) already has exactly these seeds.",
                        existing.name, existing.id
                    );
                }
            }
            let allow_empty = allow_empty || profiles.options().allow_empty_profiles;
            let created = profiles.create_profile(&name, &seeds, allow_empty).await?;
            engine.save().await?;
            for id in &created.skipped {
                eprintln!("Skipped unknown item {}", id);
            }
            print_profile(&created.profile);
        }
        ProfileCommand::Add { profile, item } => {
            let updated = profiles
                .add_seed(&ProfileId::from(profile), &ItemId::from(item))
                .await?;
            engine.save().await?;
            print_profile(&updated);
        }
        ProfileCommand::Remove { profile, item } => {
            profiles
                .remove_seed(&ProfileId::from(profile), &ItemId::from(item))
                .await?;
        }
        ProfileCommand::Show { profile, json } => {
            let id = ProfileId::from(profile);
            let Some(found) = profiles.get_profile(&id).await? else {
                println!("No profile {}", id);
                return Ok(());
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
                return Ok(());
            }
            print_profile(&found);
            for item in profiles.seed_items(&id).await? {
                println!("    {}  {} by {}", item.id, item.title, item.author);
            }
        }
        ProfileCommand::List => {
            let all = profiles.list_profiles().await?;
            println!("{} profile(s)", all.len());
            for p in all {
                print_profile(&p);
            }
        }
        ProfileCommand::Rename { profile, name } => {
            let renamed = profiles.rename_profile(&ProfileId::from(profile), &name).await?;
            engine.save().await?;
            print_profile(&renamed);
        }
        ProfileCommand::Delete { profile } => {
            let id = ProfileId::from(profile);
            if profiles.delete_profile(&id).await? {
                engine.save().await?;
                println!("Deleted {}", id);
            } else {
                println!("No profile {}", id);
            }
        }
        ProfileCommand::Recommend {
            profile,
            limit,
            include_seeds,
            exclude,
        } => {
            let search = SearchOptions {
                exclude: exclude.into_iter().map(ItemId::from).collect(),
                min_similarity: None,
            };
            let results = engine
                .ranker
                .find_similar_to_profile_with(
                    &ProfileId::from(profile),
                    limit,
                    !include_seeds,
                    &search,
                )
                .await?;
            print_results(&results);
        }
        ProfileCommand::Stats => {
            let stats = profiles.stats().await?;
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "total_profiles": stats.total_profiles,
                "total_seeds": stats.total_seeds,
                "active": stats.active,
                "empty": stats.empty,
            }))?);
        }
        ProfileCommand::Prune { min } => {
            let deleted = profiles.prune(min).await?;
            engine.save().await?;
            println!("Deleted {} profile(s) with fewer than {} seeds", deleted.len(), min);
        }
        ProfileCommand::Refresh { profile } => {
            match profile {
                Some(p) => {
                    let refreshed = profiles.refresh_aggregate(&ProfileId::from(p)).await?;
                    print_profile(&refreshed);
                }
                None => println!("Refreshed {} profile(s)", profiles.refresh_all().await?),
            }
            engine.save().await?;
        }
    }
    Ok(())
}

fn print_profile(p: &VibeProfile) {
    println!(
        "  {}  {}  ({} seed(s), {:?})",
        p.id,
        p.name,
        p.size(),
        p.state()
    );
}

fn print_results(results: &[SimilarityResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for r in results {
        let first = r.item.text.lines().next().unwrap_or("").trim();
        let preview = truncate(first, 60);
        println!(
            "  {:.3}  {}  {} by {}  {}",
            r.similarity, r.item.id, r.item.title, r.item.author, preview
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}
