use anyhow::Result;

use sentiment_space::config::AppConfig;
use sentiment_space::db;
use sentiment_space::thoughts::stats::{thought_stats, UNANALYZED};
use sentiment_space::thoughts::types::Sentiment;

/// Display journal statistics in the terminal.
pub fn stats(config: &AppConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;

    let response = thought_stats(&conn)?;

    println!("Journal Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total thoughts:      {}", response.total);
    println!();

    println!("By Sentiment:");
    let labels = Sentiment::ALL.iter().map(Sentiment::as_str).chain([UNANALYZED]);
    for label in labels {
        let count = response.sentiment_distribution.get(label).copied().unwrap_or(0);
        println!("  {:<12} {}", label, count);
    }
    println!();

    if let Some(ref oldest) = response.oldest {
        println!("Oldest thought:        {oldest}");
    }
    if let Some(ref newest) = response.newest {
        println!("Newest thought:        {newest}");
    }

    Ok(())
}
