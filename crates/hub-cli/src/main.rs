//! Hub CLI - Command-line interface for the research hub.

use std::io::{self, BufRead, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use hub_core::{
    HubConfig, HubError, IndexMode, NotebookId, NotebookPatch, PathPicker, Result, SearchTarget,
};
use hub_http::HttpBackend;
use hub_notebook::{missing_placeholders, Hub, DEFAULT_TEMPLATE_ID};
use hub_query::SearchSession;
use hub_store::SqliteSlotStore;

/// Hub - notebooks, indexing and cited search over your documents
#[derive(Parser)]
#[command(name = "hub")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: user config dir, then ./research-hub.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Notebook service address, overriding the config
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage notebooks
    Notebook {
        #[command(subcommand)]
        action: NotebookAction,
    },

    /// Manage the files of a notebook
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },

    /// Index a notebook's files
    Index {
        /// Notebook id
        id: NotebookId,

        /// Use the advanced parsing pipeline
        #[arg(long)]
        advanced: bool,
    },

    /// Ask a question and print the answer with its sources
    Search {
        /// Search query
        query: String,

        /// Search inside this notebook
        #[arg(short, long, conflicts_with = "collection")]
        notebook: Option<NotebookId>,

        /// Use the advanced index
        #[arg(long)]
        advanced: bool,

        /// Global collection to search (default from config)
        #[arg(long)]
        collection: Option<String>,

        /// Number of passages to retrieve (default from config)
        #[arg(short = 'k', long)]
        top_k: Option<u32>,

        /// Prompt template id
        #[arg(short, long, default_value = DEFAULT_TEMPLATE_ID)]
        prompt: String,
    },

    /// Manage prompt templates
    Prompt {
        #[command(subcommand)]
        action: PromptAction,
    },

    /// Check that the notebook service is reachable
    Health,
}

#[derive(Subcommand)]
enum NotebookAction {
    /// List all notebooks
    List,

    /// Create a new notebook
    Create {
        /// Notebook name
        name: String,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Rename or re-describe a notebook
    Update {
        /// Notebook id
        id: NotebookId,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a notebook
    Delete {
        /// Notebook id
        id: NotebookId,
    },
}

#[derive(Subcommand)]
enum FilesAction {
    /// List a notebook's files in insertion order
    List {
        /// Notebook id
        id: NotebookId,
    },

    /// Add files (reads one path from stdin when none are given)
    Add {
        /// Notebook id
        id: NotebookId,

        /// File paths
        paths: Vec<String>,
    },

    /// Remove files
    Remove {
        /// Notebook id
        id: NotebookId,

        /// File paths
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum PromptAction {
    /// List prompt templates
    List,

    /// Print a template
    Show {
        /// Template id
        #[arg(default_value = DEFAULT_TEMPLATE_ID)]
        id: String,
    },

    /// Save the custom template (`-` reads it from stdin)
    Save {
        /// Template content
        content: String,
    },

    /// Print the default template as a starting point for the custom one
    Restore {
        /// Also save it as the custom template
        #[arg(long)]
        save: bool,
    },
}

/// Reads one path from stdin; an empty line means cancel.
struct StdinPathPicker;

impl PathPicker for StdinPathPicker {
    fn pick(&self) -> Result<Option<String>> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let path = line.trim();
        Ok((!path.is_empty()).then(|| path.to_string()))
    }
}

/// `RUST_LOG` wins when set; otherwise `--verbose` picks debug over warn.
fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<&PathBuf>, url: Option<String>) -> Result<HubConfig> {
    let mut config = match path {
        Some(path) => HubConfig::load(path)?,
        None => HubConfig::load_default()?,
    };
    if let Some(url) = url {
        config.server.base_url = url;
    }
    config.validate()?;
    Ok(config)
}

fn build_hub(config: &HubConfig) -> Result<Hub<HttpBackend>> {
    let backend = Arc::new(HttpBackend::from_config(&config.server)?);
    let slots = Arc::new(SqliteSlotStore::open(&config.storage.state_path)?);
    debug!("Using state database at {:?}", config.storage.state_path);
    Ok(Hub::new(backend, slots))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref(), cli.url)?;
    let hub = build_hub(&config)?;

    match cli.command {
        Commands::Notebook { action } => notebook(&hub, action).await,
        Commands::Files { action } => files(&hub, action).await,
        Commands::Index { id, advanced } => {
            index(&hub, id, IndexMode::from_advanced(advanced)).await
        }
        Commands::Search {
            query,
            notebook,
            advanced,
            collection,
            top_k,
            prompt,
        } => {
            let mode = IndexMode::from_advanced(advanced);
            let target = match (notebook, collection) {
                (Some(id), _) => SearchTarget::notebook(id, mode),
                (None, Some(name)) => SearchTarget::Collection(name),
                (None, None) if advanced => SearchTarget::global(mode),
                (None, None) => SearchTarget::Collection(config.search.default_collection.clone()),
            };
            let top_k = top_k.unwrap_or(config.search.default_top_k);
            search(&hub, &config, &query, target, top_k, &prompt).await
        }
        Commands::Prompt { action } => prompt(&hub, action),
        Commands::Health => {
            hub.health().await?;
            println!("Notebook service at {} is up.", config.server.base_url);
            Ok(())
        }
    }
}

async fn notebook(hub: &Hub<HttpBackend>, action: NotebookAction) -> Result<()> {
    match action {
        NotebookAction::List => {
            let notebooks = hub.refresh().await?;
            if notebooks.is_empty() {
                println!("No notebooks found.");
                return Ok(());
            }
            println!("Found {} notebooks:\n", notebooks.len());
            for nb in notebooks {
                if nb.description.is_empty() {
                    println!("- [{}] {}", nb.id, nb.name);
                } else {
                    println!("- [{}] {}: {}", nb.id, nb.name, nb.description);
                }
            }
        }
        NotebookAction::Create { name, description } => {
            let nb = hub.create_notebook(&name, &description).await?;
            println!("Notebook '{}' created with id {}.", nb.name, nb.id);
        }
        NotebookAction::Update {
            id,
            name,
            description,
        } => {
            let patch = NotebookPatch { name, description };
            if patch.is_empty() {
                return Err(HubError::validation(
                    "nothing to update: pass --name and/or --description",
                ));
            }
            let nb = hub.update_notebook(id, patch).await?;
            println!("Notebook {} is now '{}'.", nb.id, nb.name);
        }
        NotebookAction::Delete { id } => {
            hub.delete_notebook(id).await?;
            println!("Notebook {} deleted.", id);
        }
    }
    Ok(())
}

async fn files(hub: &Hub<HttpBackend>, action: FilesAction) -> Result<()> {
    match action {
        FilesAction::List { id } => {
            let files = hub.list_files(id).await?;
            if files.is_empty() {
                println!("Notebook {} has no files.", id);
            }
            for path in files {
                println!("{}", path);
            }
        }
        FilesAction::Add { id, paths } => {
            let added = if paths.is_empty() {
                eprintln!("Path to add (empty to cancel):");
                hub.add_from_picker(id, &StdinPathPicker).await?
            } else {
                hub.add_files(id, &paths[..]).await?
            };
            if added.is_empty() {
                println!("Nothing to add.");
            } else {
                println!("Added {} file(s). Re-index to search them.", added.len());
            }
        }
        FilesAction::Remove { id, paths } => {
            let removed = hub.remove_files(id, &paths[..]).await?;
            println!("Removed {} file(s).", removed.len());
        }
    }
    Ok(())
}

async fn index(hub: &Hub<HttpBackend>, id: NotebookId, mode: IndexMode) -> Result<()> {
    println!("Indexing notebook {} ({})...", id, mode);
    let job = hub.start_indexing(id, mode).await?;
    println!(
        "Indexed {} file(s) [job {}, snapshot {}]",
        job.files.len(),
        job.job_id,
        &job.fingerprint_hex()[..12]
    );
    Ok(())
}

async fn search(
    hub: &Hub<HttpBackend>,
    config: &HubConfig,
    query: &str,
    target: SearchTarget,
    top_k: u32,
    prompt_id: &str,
) -> Result<()> {
    let session = SearchSession::from_hub(hub, config.search.clone());
    let result = session.execute(query, target, top_k, prompt_id).await?;

    println!("{}\n", result.main_response.text.trim());
    println!("Sources:");
    for (rank, citation) in session.citations().iter().enumerate() {
        println!("  [{}] {}", rank + 1, citation);
    }
    Ok(())
}

fn prompt(hub: &Hub<HttpBackend>, action: PromptAction) -> Result<()> {
    let prompts = hub.prompts();
    match action {
        PromptAction::List => {
            for template in prompts.list()? {
                let kind = if template.is_custom { "custom" } else { "built-in" };
                println!("- {} ({}): {}", template.id, kind, template.name);
            }
        }
        PromptAction::Show { id } => {
            println!("{}", prompts.get(&id)?.content);
        }
        PromptAction::Save { content } => {
            let content = if content == "-" {
                let mut buf = String::new();
                io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                content
            };
            for placeholder in missing_placeholders(&content) {
                eprintln!("warning: template does not use {}", placeholder);
            }
            prompts.save_custom(&content)?;
            println!("Custom prompt saved.");
        }
        PromptAction::Restore { save } => {
            let content = prompts.restore_default()?;
            if save {
                prompts.save_custom(&content)?;
                eprintln!("Custom prompt reset to the default template.");
            }
            println!("{}", content);
        }
    }
    Ok(())
}
