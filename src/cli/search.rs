//! Search command.

use console::style;
use tracing::debug;

use yandex_xml::{CancellationToken, Error, SearchQuery, YandexXml};

use super::helpers::{format_size, truncate};

/// Run a query and print the results.
pub async fn cmd_search(client: &YandexXml, query: &SearchQuery, json: bool) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling search");
            on_interrupt.cancel();
        }
    });

    let response = match client.search_with_cancel(query, &cancel).await {
        Ok(response) => response,
        Err(Error::Validation(errors)) => {
            for error in &errors.0 {
                eprintln!("{} {}: {}", style("✗").red(), error.field, error.message);
            }
            anyhow::bail!("invalid query");
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.is_empty() {
        println!("{} No results", style("!").yellow());
        return Ok(());
    }

    if let Some(found) = &response.found_human {
        println!("\n{}", style(found).bold());
    }

    for record in &response.records {
        println!(
            "\n{} {}",
            style(format!("{:>3}.", record.position)).dim(),
            style(truncate(&record.title, 90)).bold()
        );
        println!("     {}", style(&record.url).cyan());
        if !record.snippet.is_empty() {
            println!("     {}", truncate(&record.snippet, 160));
        }

        let mut meta = vec![record.domain.clone()];
        if !record.lang.is_empty() {
            meta.push(record.lang.clone());
        }
        if record.size > 0 {
            meta.push(format_size(record.size));
        }
        if let Some(modified) = record.modified {
            meta.push(modified.format("%Y-%m-%d").to_string());
        }
        println!("     {}", style(meta.join(" · ")).dim());
    }

    Ok(())
}
