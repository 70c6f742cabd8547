//! EDB command line interface.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use edb::content::{GenericContent, HEAD_KEY, NAME_KEY, UUID_KEY};
use edb::edb::{EdbConfig, EdbError, EdbHandler};

#[derive(Parser)]
#[command(name = "edb", version, about = "Versioned generic content over Git")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// EDB root directory, overrides the configuration
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store one content and commit it
    Put {
        /// path levels as name=value, outermost first
        #[arg(required = true)]
        path: Vec<String>,
        /// additional property as key=value
        #[arg(short = 's', long = "set")]
        properties: Vec<String>,
        /// replace the content with this uuid
        #[arg(long)]
        uuid: Option<Uuid>,
        #[arg(short, long, default_value = "edb")]
        user: String,
        #[arg(short, long, default_value = "edb@localhost")]
        email: String,
    },
    /// Remove contents by uuid and commit
    Remove {
        #[arg(required = true)]
        uuids: Vec<Uuid>,
        #[arg(short, long, default_value = "edb")]
        user: String,
        #[arg(short, long, default_value = "edb@localhost")]
        email: String,
    },
    /// Search the committed contents
    Query {
        query: String,
        /// print the head revision before the matches
        #[arg(long)]
        head: bool,
    },
    /// Print the head revision
    Head,
    /// Undo the last revisions
    Reset {
        /// the head the reset expects
        head: String,
        steps: usize,
    },
    /// Show the revision log
    Log {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// List directory names below a path
    Nodes { segments: Vec<String> },
    /// Rebuild the index from the head revision
    RebuildIndex,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("edb=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("edb=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), EdbError> {
    let mut config = match &cli.config {
        Some(path) => EdbConfig::load(path)?,
        None => EdbConfig::default(),
    };
    if let Some(root) = cli.root {
        config.root = root;
    }

    let handler = EdbHandler::open(config)?;

    match cli.command {
        Command::Put {
            path,
            properties,
            uuid,
            user,
            email,
        } => {
            let (names, values): (Vec<String>, Vec<String>) = path
                .iter()
                .map(|pair| split_pair(pair))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .unzip();

            let mut content = GenericContent::new(handler.repository_base(), &names, &values);
            if let Some(uuid) = uuid {
                content.set_uuid(uuid);
            }
            for pair in &properties {
                let (key, value) = split_pair(pair)?;
                content.set_property(key, value);
            }

            handler.add(std::slice::from_mut(&mut content))?;
            let head = handler.commit(&user, &email)?;
            match content.uuid() {
                Some(uuid) => println!("{} {}", uuid, head),
                None => println!("{}", head),
            }
        }
        Command::Remove { uuids, user, email } => {
            let contents: Vec<GenericContent> = uuids
                .into_iter()
                .map(|uuid| {
                    let mut content = GenericContent::detached();
                    content.set_uuid(uuid);
                    content
                })
                .collect();

            handler.remove(&contents)?;
            println!("{}", handler.commit(&user, &email)?);
        }
        Command::Query { query, head } => {
            for content in handler.query(&query, head)? {
                print_content(&content);
            }
        }
        Command::Head => println!("{}", handler.head_info()),
        Command::Reset { head, steps } => println!("{}", handler.reset(&head, steps)?),
        Command::Log { limit } => {
            for commit in handler.history(limit)? {
                println!(
                    "{} {} <{}> {} {}",
                    commit.id.short(),
                    commit.author_name,
                    commit.author_email,
                    commit.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    commit.summary()
                );
            }
        }
        Command::Nodes { segments } => {
            let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
            for node in handler.query_nodes(&segments)? {
                println!("{}", node.property(NAME_KEY).unwrap_or_default());
            }
        }
        Command::RebuildIndex => {
            handler.rebuild_index()?;
            println!("{}", handler.head_info());
        }
    }

    Ok(())
}

fn split_pair(pair: &str) -> Result<(String, String), EdbError> {
    pair.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| EdbError::InvalidConfig(format!("expected key=value, got '{}'", pair)))
}

fn print_content(content: &GenericContent) {
    if let Some(head) = content.property(HEAD_KEY) {
        println!("{}={}", HEAD_KEY, head);
        return;
    }

    let uuid = content.uuid().map(|u| u.to_string()).unwrap_or_default();
    let properties: Vec<String> = content
        .properties()
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    println!("{}={} {}", UUID_KEY, uuid, properties.join(" "));
}
