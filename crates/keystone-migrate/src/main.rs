//! keystone-migrate CLI
//!
//! Command-line tool for applying the bundled migrations.

use clap::{Parser, Subcommand};
use keystone_core::{DriverName, QueryBuilder};
use keystone_sqlx::{Connection, ConnectionConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use keystone_migrate::prelude::*;

/// Dialect-aware schema migrations.
#[derive(Parser)]
#[command(name = "keystone-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database DSN, e.g. `sqlite:app.db?mode=rwc` or `postgres://localhost/app`.
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3?mode=rwc")]
    database: String,

    /// Prefix substituted for `%` in `{{%table}}` names.
    #[arg(short, long, default_value = "")]
    table_prefix: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the migrations system (create history table).
    Init,

    /// Apply pending migrations.
    Up {
        /// Number of migrations to apply (all if not specified).
        #[arg(short, long)]
        count: Option<usize>,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back applied migrations, most recent first.
    Down {
        /// Number of migrations to roll back.
        #[arg(short, long, default_value_t = 1)]
        count: usize,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Show applied migrations.
    History {
        /// App name to show (all if not specified).
        #[arg(short, long)]
        app: Option<String>,
    },

    /// Print the SQL of the bundled migrations without connecting.
    Sql {
        /// Dialect to render for; defaults to the one named by the DSN.
        #[arg(long)]
        driver: Option<String>,

        /// Show rollback SQL instead of forward SQL.
        #[arg(short, long)]
        reverse: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ConnectionConfig::new(&cli.database).with_table_prefix(&cli.table_prefix);

    if let Commands::Sql { driver, reverse } = &cli.command {
        let driver = match driver {
            Some(name) => DriverName::from_name(name)?,
            None => config.driver_name()?,
        };
        print_sql(driver, &cli.table_prefix, *reverse)?;
        return Ok(());
    }

    let db = Connection::open(config).await?;
    let migrations = i18n::migrations(db.driver_name());

    match cli.command {
        Commands::Init => {
            info!("Initializing migrations system...");
            MigrationExecutor::new(&db).init().await?;
            info!("Migrations table created successfully.");
        }

        Commands::Up { count, dry_run } => {
            let executor = MigrationExecutor::new(&db).dry_run(dry_run);
            executor.init().await?;
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }

            let pending = if dry_run {
                migrations.iter().collect()
            } else {
                executor.pending(&migrations).await?
            };
            if pending.is_empty() {
                info!("No new migrations found. Your system is up-to-date.");
            }
            for migration in pending.into_iter().take(count.unwrap_or(usize::MAX)) {
                executor.apply(migration).await?;
            }
        }

        Commands::Down { count, dry_run } => {
            let executor = MigrationExecutor::new(&db).dry_run(dry_run);
            executor.init().await?;

            let applied = executor.history().get_applied().await?;
            let mut rolled_back = 0;
            for record in applied.iter().rev().take(count) {
                let Some(migration) = migrations
                    .iter()
                    .find(|m| m.app == record.app && m.name == record.name)
                else {
                    return Err(MigrateError::MigrationNotFound {
                        app: record.app.clone(),
                        name: record.name.clone(),
                    }
                    .into());
                };
                executor.rollback(migration).await?;
                rolled_back += 1;
            }
            if rolled_back == 0 {
                info!("No migration has been done before.");
            }
        }

        Commands::History { app } => {
            let history = MigrationHistory::new(&db);
            history.ensure_table().await?;

            let applied = match &app {
                Some(app) => history.get_applied_for_app(app).await?,
                None => history.get_applied().await?,
            };

            if applied.is_empty() {
                info!("No migrations have been applied yet.");
            } else {
                println!("\nApplied migrations:");
                println!("{:-<60}", "");
                for migration in &applied {
                    println!(
                        " [X] {}/{} ({})",
                        migration.app,
                        migration.name,
                        migration.applied_at.format("%Y-%m-%d %H:%M:%S")
                    );
                }
                println!();
            }
        }

        Commands::Sql { .. } => {}
    }

    Ok(())
}

fn print_sql(driver: DriverName, table_prefix: &str, reverse: bool) -> anyhow::Result<()> {
    let qb = QueryBuilder::new(driver.driver()).with_table_prefix(table_prefix);
    for migration in i18n::migrations(driver) {
        let operations = if reverse {
            migration
                .reverse_operations()
                .ok_or_else(|| MigrateError::NotReversible(migration.id()))?
        } else {
            migration.operations.clone()
        };
        println!("-- {}", migration.id());
        for operation in &operations {
            println!("{};", operation.render(&qb)?);
        }
        println!();
    }
    Ok(())
}
