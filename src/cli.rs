use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{API_KEY_VAR, DB_HOST_VAR};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// NewsAPI key
    #[arg(long, env = API_KEY_VAR, hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Location of the SQLite database file
    #[arg(long, env = DB_HOST_VAR, global = true)]
    pub db_host: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the scheduler until interrupted (default)
    Run,

    /// Run collection cycles once and exit
    Collect(CollectArgs),

    /// List stored articles, newest first
    Articles {
        /// Exact country tag, e.g. "Italy"
        #[arg(long)]
        country: Option<String>,

        /// Substring matched against title, description and content
        #[arg(short, long)]
        search: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: u32,

        #[arg(short, long, default_value_t = 0)]
        offset: u32,

        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or register domains
    #[command(subcommand)]
    Domains(DomainsCommand),

    /// Manage the favourite domains searched by global jobs
    #[command(subcommand)]
    Favourites(FavouritesCommand),
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectArgs {
    /// Only the configured job with this name
    #[arg(short, long, conflicts_with_all = ["due", "country", "domain"])]
    pub job: Option<String>,

    /// Only the jobs scheduled for the current minute
    #[arg(long, conflicts_with_all = ["country", "domain"])]
    pub due: bool,

    /// Ad-hoc headlines cycle for a country
    #[arg(long, conflicts_with = "domain", requires = "language")]
    pub country: Option<String>,

    /// Language tag stored with an ad-hoc country cycle
    #[arg(long, requires = "country")]
    pub language: Option<String>,

    /// Ad-hoc global cycle for one domain
    #[arg(long)]
    pub domain: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DomainsCommand {
    /// List known domains
    List {
        #[arg(long, conflicts_with = "others")]
        favourites: bool,

        #[arg(long)]
        others: bool,

        /// Print the domains as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register a domain before it has been seen in any article
    Add { name: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum FavouritesCommand {
    /// Replace the favourite set with exactly these domains
    Set {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Flag more domains as favourites
    Add {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Clear every favourite flag
    Clear,
}
