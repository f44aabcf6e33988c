//! tinyRAG CLI — the main entry point.
//!
//! Commands:
//! - `serve`    — Start the HTTP/SSE server
//! - `ask`      — Answer one question, streaming the reply
//! - `chat`     — Interactive question loop in one conversation
//! - `ingest`   — Add a file, raw text or a Wikipedia article
//! - `search`   — Show ranked chunks for a query
//! - `sources`  — List ingested articles
//! - `count`    — Total stored chunks
//! - `delete`   — Remove an article
//! - `config`   — Show, validate or initialise configuration

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tinyrag",
    about = "tinyRAG — retrieval-augmented answers from a local knowledge base",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Answer a single question
    Ask(AskArgs),

    /// Ask questions interactively within one conversation
    Chat {
        /// Continue an existing conversation
        #[arg(long)]
        chat: Option<String>,

        /// Persona to answer with
        #[arg(long)]
        persona: Option<String>,

        /// Use deep-research mode for every question
        #[arg(long)]
        deep: bool,
    },

    /// Add content to the knowledge base
    Ingest(IngestArgs),

    /// Show the chunks a query retrieves
    Search {
        query: String,

        /// Number of primary hits
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// List ingested articles with their chunk counts
    Sources,

    /// Print the total number of stored chunks
    Count,

    /// Delete all chunks of an article
    Delete { article: String },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct AskArgs {
    question: String,

    /// Continue an existing conversation
    #[arg(long)]
    chat: Option<String>,

    /// Persona to answer with
    #[arg(long)]
    persona: Option<String>,

    /// Number of primary hits
    #[arg(short, long)]
    k: Option<usize>,

    /// Print the retrieval trace
    #[arg(long)]
    debug: bool,

    /// Larger retrieval and a structured research answer
    #[arg(long)]
    deep: bool,

    /// Skip generation and print the retrieved context
    #[arg(long)]
    offline: bool,
}

#[derive(Args)]
struct IngestArgs {
    /// Read a text file
    #[arg(
        short,
        long,
        required_unless_present_any = ["text", "wiki"],
        conflicts_with_all = ["text", "wiki"]
    )]
    file: Option<std::path::PathBuf>,

    /// Ingest the given text
    #[arg(long, conflicts_with = "wiki")]
    text: Option<String>,

    /// Fetch a Wikipedia article
    #[arg(long)]
    wiki: Option<String>,

    /// Article name to store under
    #[arg(short, long)]
    title: Option<String>,

    /// Wikipedia language (defaults to the settings language)
    #[arg(long)]
    lang: Option<String>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
    /// Check the configuration for errors
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let logs = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        logs.json().init();
    } else {
        logs.init();
    }

    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(port, host).await?,
        Commands::Ask(args) => commands::ask::run(args.into_request()).await?,
        Commands::Chat { chat, persona, deep } => commands::chat::run(chat, persona, deep).await?,
        Commands::Ingest(args) => commands::knowledge::ingest(args.into_source()).await?,
        Commands::Search { query, k } => commands::knowledge::search(&query, k).await?,
        Commands::Sources => commands::knowledge::sources().await?,
        Commands::Count => commands::knowledge::count().await?,
        Commands::Delete { article } => commands::knowledge::delete(&article).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}

impl AskArgs {
    fn into_request(self) -> tinyrag_agent::SessionRequest {
        let mut request = tinyrag_agent::SessionRequest::new(self.question);
        request.chat_id = self.chat;
        request.persona_id = self.persona;
        request.k = self.k;
        request.debug = self.debug;
        request.deep = self.deep;
        request.offline = self.offline;
        request
    }
}

impl IngestArgs {
    fn into_source(self) -> commands::knowledge::IngestSource {
        use commands::knowledge::IngestSource;
        if let Some(article) = self.wiki {
            IngestSource::Wiki {
                title: self.title.unwrap_or_else(|| article.clone()),
                article,
                lang: self.lang,
            }
        } else if let Some(path) = self.file {
            IngestSource::File { path, title: self.title }
        } else {
            IngestSource::Text {
                text: self.text.unwrap_or_default(),
                title: self.title,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commands::knowledge::IngestSource;

    #[test]
    fn ask_flags_map_onto_request() {
        let cli = Cli::try_parse_from(["tinyrag", "ask", "Was ist Mars?", "--deep", "-k", "7", "--chat", "chat-1"])
            .unwrap();
        let Commands::Ask(args) = cli.command else {
            panic!("expected ask");
        };
        let request = args.into_request();
        assert_eq!(request.question, "Was ist Mars?");
        assert!(request.deep);
        assert!(!request.offline);
        assert_eq!(request.k, Some(7));
        assert_eq!(request.chat_id.as_deref(), Some("chat-1"));
    }

    #[test]
    fn ingest_needs_exactly_one_input() {
        assert!(Cli::try_parse_from(["tinyrag", "ingest"]).is_err());
        assert!(Cli::try_parse_from(["tinyrag", "ingest", "--text", "a", "--wiki", "Mars"]).is_err());

        let cli = Cli::try_parse_from(["tinyrag", "ingest", "--wiki", "Mars", "--lang", "en"]).unwrap();
        let Commands::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        match args.into_source() {
            IngestSource::Wiki { article, title, lang } => {
                assert_eq!(article, "Mars");
                assert_eq!(title, "Mars");
                assert_eq!(lang.as_deref(), Some("en"));
            }
            _ => panic!("expected wiki source"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tinyrag", "count", "--verbose", "--log-json"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.log_json);
    }
}
