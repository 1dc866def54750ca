use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use mealledger_core::{ActorId, InventoryItemId, TenantId};
use mealledger_infra::audit::PostgresAuditLog;
use mealledger_infra::db::{connect_database, migrate};
use mealledger_infra::ledger_store::{MovementFilter, Pagination, PostgresLedgerStore, StockLedgerStore};
use mealledger_infra::projections::{inventory_valuation, reconcile_tenant};
use mealledger_infra::{LedgerConfig, StockCommandDispatcher, StockOperations};
use mealledger_inventory::MovementKind;
use mealledger_observability::LogFormat;

#[derive(Parser)]
#[command(name = "mealledger", about = "Stock ledger and costing operations", version)]
struct Cli {
    #[arg(long, global = true, env = "DATABASE_URL", help = "Postgres connection URL")]
    database_url: Option<String>,
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[arg(long, global = true, env = "LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the ledger schema.
    Migrate,
    /// Replay every item's ledger and compare it with the cached stock.
    Reconcile(TenantArgs),
    /// Stock value per item at current average cost.
    Valuation(TenantArgs),
    /// List ledger entries.
    Movements(MovementsArgs),
    /// Post a signed stock correction.
    Adjust(AdjustArgs),
}

#[derive(Args)]
struct TenantArgs {
    #[arg(long, help = "Tenant id")]
    tenant: TenantId,
}

#[derive(Args)]
struct MovementsArgs {
    #[command(flatten)]
    tenant: TenantArgs,
    #[arg(long, help = "Only entries for this item")]
    item: Option<InventoryItemId>,
    #[arg(long, help = "Only entries of this kind (IN, OUT, ADJUSTMENT, ...)")]
    kind: Option<MovementKind>,
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    offset: Option<u32>,
}

#[derive(Args)]
struct AdjustArgs {
    #[command(flatten)]
    tenant: TenantArgs,
    #[arg(long)]
    item: InventoryItemId,
    #[arg(long, allow_hyphen_values = true, help = "Signed quantity to add or remove")]
    delta: Decimal,
    #[arg(long)]
    reason: String,
    #[arg(long, help = "Acting user id")]
    actor: ActorId,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    mealledger_observability::init(cli.log_format);

    let mut config = LedgerConfig::from_env()?;
    if cli.database_url.is_some() {
        config.database_url = cli.database_url.clone();
    }
    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow!("DATABASE_URL is required"))?;
    let pool = connect_database(&database_url, config.max_connections).await?;

    match cli.command {
        Commands::Migrate => {
            migrate(&pool).await?;
            println!("Schema is up to date");
        }
        Commands::Reconcile(args) => handle_reconcile(&pool, args, cli.json).await?,
        Commands::Valuation(args) => handle_valuation(&pool, args, cli.json).await?,
        Commands::Movements(args) => handle_movements(&pool, args, cli.json).await?,
        Commands::Adjust(args) => handle_adjust(&pool, &config, args, cli.json).await?,
    }

    Ok(())
}

async fn handle_reconcile(pool: &PgPool, args: TenantArgs, json: bool) -> Result<()> {
    let store = PostgresLedgerStore::new(pool.clone());
    let report = reconcile_tenant(&store, args.tenant)
        .await
        .context("failed to reconcile stock")?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "Checked {} items and {} movements",
            report.items_checked, report.movements_checked
        );
        for discrepancy in &report.discrepancies {
            println!("  {discrepancy:?}");
        }
    }

    if !report.is_clean() {
        return Err(anyhow!(
            "{} item(s) disagree with their ledger",
            report.discrepancies.len()
        ));
    }
    Ok(())
}

async fn handle_valuation(pool: &PgPool, args: TenantArgs, json: bool) -> Result<()> {
    let store = PostgresLedgerStore::new(pool.clone());
    let summary = inventory_valuation(&store, args.tenant)
        .await
        .context("failed to value inventory")?;

    if json {
        return print_json(&summary);
    }

    for item in &summary.items {
        println!(
            "{:<32} {:>12} {:<8} @ {:>12} = {:>16}",
            item.name, item.current_stock, item.unit, item.average_cost, item.stock_value
        );
    }
    println!("Total value: {} across {} items", summary.total_value, summary.total_items);
    Ok(())
}

async fn handle_movements(pool: &PgPool, args: MovementsArgs, json: bool) -> Result<()> {
    let store = PostgresLedgerStore::new(pool.clone());
    let filter = MovementFilter {
        item_id: args.item,
        kind: args.kind,
        ..MovementFilter::default()
    };
    let page = store
        .query_movements(args.tenant.tenant, filter, Pagination::new(args.limit, args.offset))
        .await
        .context("failed to query movements")?;

    if json {
        return print_json(&page.movements);
    }

    for movement in &page.movements {
        let reference = movement
            .reference
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} {} #{:<5} {:<10} {:>12} @ {:>12}  {} -> {}  {}",
            movement.occurred_at.format("%Y-%m-%d %H:%M"),
            movement.item_id,
            movement.sequence,
            movement.kind,
            movement.quantity,
            movement.unit_cost,
            movement.stock_before,
            movement.stock_after,
            reference
        );
    }
    println!(
        "{} of {} movements{}",
        page.movements.len(),
        page.total,
        if page.has_more { " (more available)" } else { "" }
    );
    Ok(())
}

async fn handle_adjust(pool: &PgPool, config: &LedgerConfig, args: AdjustArgs, json: bool) -> Result<()> {
    let store: Arc<dyn StockLedgerStore> = Arc::new(PostgresLedgerStore::new(pool.clone()));
    let ops = StockOperations::new(
        StockCommandDispatcher::new(store, config.max_commit_attempts),
        Arc::new(PostgresAuditLog::new(pool.clone())),
    );

    let movement = ops
        .adjust_stock(args.tenant.tenant, args.item, args.actor, args.delta, &args.reason)
        .await
        .context("failed to adjust stock")?;

    if json {
        print_json(&movement)?;
    } else {
        println!(
            "Adjusted {} by {}: {} -> {}",
            movement.item_id, movement.quantity, movement.stock_before, movement.stock_after
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
