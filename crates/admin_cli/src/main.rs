use std::error::Error;

use clap::{Args, Parser, Subcommand};
use engine::Ledger;
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};

#[derive(Parser, Debug)]
#[command(name = "tally_admin")]
#[command(about = "Admin utilities for Tally (customers, reconciliation)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./tally.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Customer(Customer),
    Reconcile(Reconcile),
    /// Clear transaction links pointing at deleted or missing targets.
    RepairLinks,
}

#[derive(Args, Debug)]
struct Customer {
    #[command(subcommand)]
    command: CustomerCommand,
}

#[derive(Subcommand, Debug)]
enum CustomerCommand {
    Create(CustomerCreateArgs),
    List,
}

#[derive(Args, Debug)]
struct CustomerCreateArgs {
    #[arg(long)]
    name: String,
}

#[derive(Args, Debug)]
struct Reconcile {
    #[command(subcommand)]
    command: ReconcileCommand,
}

#[derive(Subcommand, Debug)]
enum ReconcileCommand {
    /// Report customers whose cached balances disagree with their history.
    Check,
    /// Repair drifted balances and backfill missing audit entries.
    Run,
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let ledger = Ledger::builder().database(db).build().await?;

    match cli.command {
        Command::Customer(Customer {
            command: CustomerCommand::Create(args),
        }) => {
            let customer = ledger.create_customer(&args.name).await?;
            println!("created customer: {} ({})", customer.id, customer.name);
        }
        Command::Customer(Customer {
            command: CustomerCommand::List,
        }) => {
            let customers = ledger.customers().await?;
            println!(
                "{:<36}  {:>14}  {:>14}  NAME",
                "ID", "OUTSTANDING", "CREDIT"
            );
            for customer in customers {
                println!(
                    "{:<36}  {:>14}  {:>14}  {}",
                    customer.id.to_string(),
                    customer.balances.outstanding.to_string(),
                    customer.balances.credit.to_string(),
                    customer.name
                );
            }
        }
        Command::Reconcile(Reconcile {
            command: ReconcileCommand::Check,
        }) => {
            let discrepancies = ledger.detect_discrepancies().await?;
            if discrepancies.is_empty() {
                println!("all balances consistent");
                return Ok(());
            }
            println!(
                "{:<36}  {:>14}  {:>14}  {:>14}  {:>14}",
                "CUSTOMER", "STORED DEBT", "ACTUAL DEBT", "STORED CREDIT", "ACTUAL CREDIT"
            );
            for d in &discrepancies {
                println!(
                    "{:<36}  {:>14}  {:>14}  {:>14}  {:>14}",
                    d.customer_id.to_string(),
                    d.stored.outstanding.kobo(),
                    d.computed.outstanding.kobo(),
                    d.stored.credit.kobo(),
                    d.computed.credit.kobo()
                );
            }
            std::process::exit(1);
        }
        Command::Reconcile(Reconcile {
            command: ReconcileCommand::Run,
        }) => {
            let report = ledger.reconcile().await?;
            println!("examined:          {}", report.examined);
            println!("repaired:          {}", report.repaired.len());
            println!("backfilled audits: {}", report.backfilled_audits);
            for customer_id in &report.repaired {
                println!("  repaired {customer_id}");
            }
            if !report.failures.is_empty() {
                eprintln!("failures:");
                for (customer_id, err) in &report.failures {
                    eprintln!("  {customer_id}: {err}");
                }
                std::process::exit(1);
            }
        }
        Command::RepairLinks => {
            let cleared = ledger.repair_orphaned_links().await?;
            println!("cleared {cleared} orphaned transaction links");
        }
    }

    Ok(())
}
