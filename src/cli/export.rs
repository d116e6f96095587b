use anyhow::Result;

use sentiment_space::config::AppConfig;
use sentiment_space::export::ExportDocument;
use sentiment_space::thoughts::store::{self, ListQuery};

/// Export all thoughts as JSON to stdout, oldest first.
pub fn export(config: &AppConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = sentiment_space::db::open_database(&db_path)?;

    let total = store::count_thoughts(&conn, None)?;
    let mut thoughts = store::list_thoughts(
        &conn,
        &ListQuery {
            limit: total as usize,
            offset: 0,
            sentiment: None,
        },
    )?;
    thoughts.reverse();

    let json = serde_json::to_string_pretty(&ExportDocument::new(&thoughts))?;
    println!("{json}");

    eprintln!("Exported {} thoughts.", thoughts.len());

    Ok(())
}
