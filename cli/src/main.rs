mod commands;
mod config;
mod server;

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_recipe_categories, cmd_recipe_delete, cmd_recipe_favorite, cmd_recipe_list,
    cmd_recipe_show, cmd_user_add,
};
use crate::config::Config;
use recipebox_core::db::Database;
use recipebox_core::images::FsImageStore;
use recipebox_core::models::DEFAULT_MAX_CATEGORIES;
use recipebox_core::users::seed_accounts;

const DEFAULT_LOG_FILTER: &str = "recipebox=info,recipebox_core=info,tower_http=info";

#[derive(Parser)]
#[command(
    name = "recipebox",
    version,
    about = "A small personal recipe box",
    long_about = "Keep your recipes, photos, favorites and categories in one place.\n\
                  Run `recipebox serve` for the web API or use the recipe commands directly."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
pub(crate) struct GlobalArgs {
    /// Directory holding the database (default: platform data directory)
    #[arg(long, global = true, env = "RECIPEBOX_DATA_DIR", value_name = "PATH")]
    pub(crate) data_dir: Option<PathBuf>,
    /// Directory for uploaded images, served under /uploads/
    #[arg(
        long,
        global = true,
        env = "RECIPEBOX_UPLOADS_DIR",
        default_value = "uploads",
        value_name = "PATH"
    )]
    pub(crate) uploads_dir: PathBuf,
    /// Maximum number of distinct categories per recipe
    #[arg(long, global = true, env = "RECIPEBOX_MAX_CATEGORIES", default_value_t = DEFAULT_MAX_CATEGORIES)]
    pub(crate) max_categories: usize,
    /// Username of the admin account created at startup
    #[arg(long, global = true, env = "RECIPEBOX_ADMIN_USERNAME", default_value = "admin")]
    pub(crate) admin_username: Option<String>,
    /// Password of the admin account created at startup
    #[arg(long, global = true, env = "RECIPEBOX_ADMIN_PASSWORD", hide_env_values = true)]
    pub(crate) admin_password: Option<String>,
    /// Username of the regular account created at startup
    #[arg(long, global = true, env = "RECIPEBOX_USER_USERNAME", default_value = "user")]
    pub(crate) user_username: Option<String>,
    /// Password of the regular account created at startup
    #[arg(long, global = true, env = "RECIPEBOX_USER_PASSWORD", hide_env_values = true)]
    pub(crate) user_password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// List recipes
    List {
        /// Only favorites
        #[arg(long, conflicts_with = "category")]
        favorites: bool,
        /// Only recipes in this category (exact, case-sensitive)
        #[arg(short, long)]
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the categories in use
    Categories {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle the favorite flag of a recipe
    Favorite {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe and its image
    Delete {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a regular user account
    Add {
        /// Username
        username: String,
        /// Password
        password: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.global)?;
    let db = Database::open(&config.db_path)?;
    let images = FsImageStore::new(&config.uploads_dir);

    match cli.command {
        Commands::Serve { port, bind } => {
            let created = seed_accounts(&db, &config.seed_accounts)?;
            if created.is_empty() {
                tracing::debug!("seed accounts already present");
            }
            server::start_server(db, images, &config, port, &bind).await
        }
        Commands::Recipe { command } => match command {
            RecipeCommands::List {
                favorites,
                category,
                json,
            } => cmd_recipe_list(
                &db,
                &images,
                config.max_categories,
                favorites,
                category.as_deref(),
                json,
            ),
            RecipeCommands::Categories { json } => cmd_recipe_categories(&db, json),
            RecipeCommands::Show { id, json } => {
                cmd_recipe_show(&db, &images, config.max_categories, id, json)
            }
            RecipeCommands::Favorite { id, json } => {
                cmd_recipe_favorite(&db, &images, config.max_categories, id, json)
            }
            RecipeCommands::Delete { id, json } => {
                cmd_recipe_delete(&db, &images, config.max_categories, id, json)
            }
        },
        Commands::User { command } => match command {
            UserCommands::Add {
                username,
                password,
                json,
            } => cmd_user_add(&db, &username, &password, json),
        },
    }
}
