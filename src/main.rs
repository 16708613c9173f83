/// Moderation Ledger - database bootstrap
///
/// Opens the configured ledger database, applies pending migrations and logs
/// a summary of what it holds.
use anyhow::Context;
use moderation_ledger::{
    config::{LedgerConfig, LogFormat},
    LedgerContext,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = LedgerConfig::from_env().context("failed to load configuration")?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("moderation_ledger={}", config.logging.level).into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    print_banner();

    let ctx = LedgerContext::new(&config).await.with_context(|| {
        format!(
            "failed to open ledger at {}",
            config.storage.ledger_db.display()
        )
    })?;

    tracing::info!(
        "Ledger ready at {} (page size {})",
        config.storage.ledger_db.display(),
        config.query.page_size
    );

    let counts = ctx.variant_counts().await?;
    let total: i64 = counts.iter().map(|(_, n)| n).sum();
    for (variant, count) in &counts {
        tracing::info!("  {:<24} {}", variant, count);
    }
    tracing::info!("{} entries across {} variants", total, counts.len());

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    moderation-ledger v{}
    case records for game-server moderation
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
