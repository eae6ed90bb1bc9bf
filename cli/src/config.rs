use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tracing::warn;

use recipebox_core::models::{Role, SeedAccount};

use crate::GlobalArgs;

pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub max_categories: usize,
    pub seed_accounts: Vec<SeedAccount>,
}

impl Config {
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let data_dir = match &args.data_dir {
            Some(dir) => dir.clone(),
            None => ProjectDirs::from("", "", "recipebox")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("recipebox.db");

        let uploads_dir = if args.uploads_dir.is_absolute() {
            args.uploads_dir.clone()
        } else {
            std::env::current_dir()
                .context("Could not determine working directory")?
                .join(&args.uploads_dir)
        };

        if args.max_categories == 0 {
            anyhow::bail!("--max-categories must be at least 1");
        }

        let seed_accounts = [
            seed_account(
                args.admin_username.as_deref(),
                args.admin_password.as_deref(),
                Role::Admin,
            ),
            seed_account(
                args.user_username.as_deref(),
                args.user_password.as_deref(),
                Role::User,
            ),
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(Config {
            data_dir,
            db_path,
            uploads_dir,
            max_categories: args.max_categories,
            seed_accounts,
        })
    }
}

fn seed_account(
    username: Option<&str>,
    password: Option<&str>,
    role: Role,
) -> Option<SeedAccount> {
    let username = username.map(str::trim).filter(|u| !u.is_empty())?;
    match password.filter(|p| !p.is_empty()) {
        Some(password) => Some(SeedAccount {
            username: username.to_string(),
            password: password.to_string(),
            role,
        }),
        None => {
            warn!(
                username,
                role = role.as_str(),
                "no password configured, skipping seed account"
            );
            None
        }
    }
}
