use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::{Pool, Postgres};

const CLI_NAME: &str = "mp-cli";

#[derive(Parser)]
#[command(name = "mp", version, about = "Marketplace node CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the public user API
    UserApi,
    /// Run the moderation API
    AdminApi,
    /// Apply database migrations
    Migrate,
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Insert default runtime configs for services that have none
    Seed,
}

#[derive(Subcommand)]
enum CatalogCommand {
    /// Insert the default categories and skills
    Seed,
}

#[derive(Subcommand)]
enum AdminCommand {
    Bootstrap {
        #[arg(long)]
        username: String,
        #[arg(long, env = "MP_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    ResetPassword {
        #[arg(long)]
        username: String,
        #[arg(long, env = "MP_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

async fn connect_from_env() -> Result<Pool<Postgres>> {
    mp_core::logging::init(CLI_NAME);
    let database_url = mp_core::config::required_env("DATABASE_URL")?;
    mp_core::db::connect(&database_url).await
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::UserApi => {
            let config = mp_user_api::load_config()?;
            mp_user_api::run(config).await?;
        }
        Commands::AdminApi => {
            let config = mp_admin_api::load_config()?;
            mp_admin_api::run(config).await?;
        }
        Commands::Migrate => {
            let pool = connect_from_env().await?;
            mp_core::migrations::run(&pool).await?;
        }
        Commands::Config { command } => {
            let pool = connect_from_env().await?;
            match command {
                ConfigCommand::Seed => {
                    let seeded = mp_core::admin::seed_service_configs(&pool).await?;
                    if seeded.is_empty() {
                        tracing::info!("no new service configs were inserted");
                    } else {
                        tracing::info!(services = ?seeded, "service configs seeded");
                    }
                }
            }
        }
        Commands::Catalog { command } => {
            let pool = connect_from_env().await?;
            match command {
                CatalogCommand::Seed => {
                    let summary = mp_core::catalog::seed_catalog(&pool).await?;
                    let output = serde_json::json!({
                        "categories": summary.categories,
                        "skills": summary.skills,
                    });
                    println!("{}", serde_json::to_string(&output)?);
                }
            }
        }
        Commands::Admin { command } => {
            let pool = connect_from_env().await?;
            match command {
                AdminCommand::Bootstrap { username, password } => {
                    let created =
                        mp_core::admin::bootstrap_admin(&pool, &username, &password).await?;
                    if created {
                        tracing::info!("admin user created");
                    } else {
                        tracing::info!("admin user already exists");
                    }
                }
                AdminCommand::ResetPassword { username, password } => {
                    mp_core::admin::reset_admin_password(&pool, &username, &password).await?;
                    tracing::info!("admin password reset");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn admin_bootstrap_parses_credentials() {
        let cli = Cli::try_parse_from([
            "mp",
            "admin",
            "bootstrap",
            "--username",
            "root",
            "--password",
            "correct horse",
        ])
        .expect("parse");
        match cli.command {
            Commands::Admin {
                command: AdminCommand::Bootstrap { username, password },
            } => {
                assert_eq!(username, "root");
                assert_eq!(password, "correct horse");
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn nested_seed_commands_parse() {
        assert!(matches!(
            Cli::try_parse_from(["mp", "catalog", "seed"]).expect("parse").command,
            Commands::Catalog {
                command: CatalogCommand::Seed
            }
        ));
        assert!(matches!(
            Cli::try_parse_from(["mp", "config", "seed"]).expect("parse").command,
            Commands::Config {
                command: ConfigCommand::Seed
            }
        ));
        assert!(Cli::try_parse_from(["mp", "relay"]).is_err());
    }
}
