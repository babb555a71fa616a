//! Quota schedule command.

use chrono::{Local, Utc};
use console::style;

use yandex_xml::YandexXml;

use super::helpers::format_delay;

/// Print the quota schedule and the derived request cadence.
pub async fn cmd_limits(client: &YandexXml, json: bool) -> anyhow::Result<()> {
    let info = client.rate_info().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("\n{}", style(format!("Quota for {}", info.server)).bold());
    println!("{}", "-".repeat(50));
    println!("{:<20} {}", "Hour limit:", info.hour_limit);
    if info.server.is_rate_limited() {
        println!("{:<20} {:.3}", "Requests/second:", info.rps_limit);
    } else {
        println!("{:<20} {}", "Requests/second:", style("unlimited").dim());
    }
    println!(
        "{:<20} {}",
        "Request delay:",
        format_delay(info.request_delay)
    );

    println!("\n{}", style("Schedule").bold());
    println!("{}", "-".repeat(50));
    println!("  {:<17} {:<17} {:>8}", "From", "To", "Requests");

    let now = Utc::now();
    for period in &info.schedule.periods {
        let from = period.from.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let to = period.to.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        let line = format!("{:<17} {:<17} {:>8}", from, to, period.count);
        if period.contains(now) {
            println!("{} {}", style("→").green(), style(line).green());
        } else {
            println!("  {}", line);
        }
    }

    Ok(())
}
