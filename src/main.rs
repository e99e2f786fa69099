use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use learnpass::config::Config;
use learnpass::db;
use learnpass::error::AppError;
use learnpass::models::CreateVoucher;
use learnpass::services::Services;
use learnpass::store::SqliteStore;

#[derive(Parser)]
#[command(name = "learnpass", version, about = "Voucher redemption and learner subscription ledger")]
struct Cli {
    /// SQLite database path (overrides DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue one or more vouchers and print their codes
    Issue {
        #[arg(long)]
        denomination: i64,
        #[arg(long, default_value_t = 1)]
        learners: i64,
        #[arg(long)]
        issuer: String,
        #[arg(long)]
        institution: String,
        #[arg(long, default_value_t = 1)]
        count: i64,
    },
    /// Redeem a voucher code for a guardian
    Redeem {
        #[arg(long)]
        code: String,
        #[arg(long)]
        user: String,
    },
    /// Spend one credit on a learner's subscription
    Spend {
        #[arg(long)]
        learner: String,
        #[arg(long)]
        guardian: String,
    },
    /// Show a learner's subscription status
    Status {
        #[arg(long)]
        learner: String,
    },
    /// Show a guardian's credit balance
    Balance {
        #[arg(long)]
        user: String,
    },
    /// Show a guardian's ledger entries, newest first
    History {
        #[arg(long)]
        user: String,
    },
    /// List vouchers issued for an institution
    Vouchers {
        #[arg(long)]
        institution: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env();
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    let pool = db::create_pool(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))?;
    let services = Services::new(Arc::new(SqliteStore::new(pool)), &config)
        .context("invalid configuration")?;

    match cli.command {
        Command::Issue {
            denomination,
            learners,
            issuer,
            institution,
            count,
        } => {
            let input = CreateVoucher {
                denomination,
                learner_count: learners,
                issued_by_user_id: issuer,
                institution_id: institution,
            };
            let issued = services.vouchers.create_batch(&input, count)?;
            let out: Vec<_> = issued
                .iter()
                .map(|v| {
                    json!({
                        "id": v.voucher.id,
                        "code": v.code,
                        "display_code": v.display_code(),
                        "denomination": v.voucher.denomination,
                        "learner_count": v.voucher.learner_count,
                        "institution_id": v.voucher.institution_id,
                    })
                })
                .collect();
            print_json(&out)
        }
        Command::Redeem { code, user } => print_json(&services.vouchers.redeem(&code, &user)?),
        Command::Spend { learner, guardian } => {
            print_json(&services.ledger.spend(&learner, &guardian)?)
        }
        Command::Status { learner } => print_json(&services.ledger.subscription_of(&learner)?),
        Command::Balance { user } => {
            let balance = services.ledger.balance_of(&user)?;
            print_json(&json!({ "user_id": user, "balance": balance }))
        }
        Command::History { user } => print_json(&services.ledger.history(&user)?),
        Command::Vouchers { institution } => {
            print_json(&services.vouchers.list_for_institution(&institution)?)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "learnpass=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Domain failures are part of the JSON contract; everything else is a crash report
            if let Some(app_err) = err.downcast_ref::<AppError>() {
                println!(
                    "{}",
                    json!({ "error": app_err.code(), "message": app_err.to_string() })
                );
                if app_err.is_client_error() {
                    return ExitCode::from(2);
                }
            } else {
                tracing::error!("{:#}", err);
            }
            ExitCode::FAILURE
        }
    }
}
