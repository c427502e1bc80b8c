//! Blocked-site list view

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use siteblock_core::ipc::IpcClient;
use siteblock_storage::BlockedSite;
use std::fmt::Display;
use std::time::Duration;
use tabled::{Table, Tabled};

use super::helpers::{format_countdown, truncate_str};

const EMPTY_MESSAGE: &str = "No websites are currently blocked.";
const MAX_SITE_CHARS: usize = 48;

#[derive(Tabled)]
struct BlockedRow {
    #[tabled(rename = "Website")]
    website: String,
    #[tabled(rename = "Until")]
    until: String,
    #[tabled(rename = "Remaining")]
    remaining: String,
}

/// `03:45 PM` style wall-clock time
fn format_clock<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    time.format("%I:%M %p").to_string()
}

fn finish_label(finish_time: i64) -> String {
    match Local.timestamp_millis_opt(finish_time).single() {
        Some(time) => format!("until {}", format_clock(&time)),
        None => "-".to_string(),
    }
}

fn to_row(site: &BlockedSite, now_ms: i64) -> BlockedRow {
    let (until, remaining) = if site.is_expired(now_ms) {
        ("-".to_string(), "Time expired".to_string())
    } else {
        (
            finish_label(site.finish_time),
            format_countdown(site.remaining_ms(now_ms)),
        )
    };

    BlockedRow {
        website: truncate_str(&site.site, MAX_SITE_CHARS),
        until,
        remaining,
    }
}

/// Render the list as a table, or the empty-state message
pub fn render_list(sites: &[BlockedSite], now_ms: i64) -> String {
    if sites.is_empty() {
        return EMPTY_MESSAGE.to_string();
    }
    let rows: Vec<BlockedRow> = sites.iter().map(|site| to_row(site, now_ms)).collect();
    Table::new(rows).to_string()
}

pub async fn show_list(client: &IpcClient) -> Result<()> {
    let sites = client.blocked_websites().await?;
    println!("{}", render_list(&sites, chrono::Utc::now().timestamp_millis()));
    Ok(())
}

/// Redraw the list every second until Ctrl-C
pub async fn watch_list(client: &IpcClient) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sites = client.blocked_websites().await?;
                // Clear screen and move the cursor home
                print!("\x1b[2J\x1b[H");
                println!("{}", render_list(&sites, chrono::Utc::now().timestamp_millis()));
                println!("\nPress Ctrl-C to stop.");
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_empty_list_message() {
        assert_eq!(render_list(&[], NOW), "No websites are currently blocked.");
    }

    #[test]
    fn test_rows_show_countdown_and_expiry() {
        let sites = vec![
            BlockedSite::new("example.com", NOW + 90 * 60_000),
            BlockedSite::new("old.com", NOW - 1),
        ];
        let table = render_list(&sites, NOW);

        assert!(table.contains("Website"));
        assert!(table.contains("example.com"));
        assert!(table.contains("1h 30m 00s"));
        assert!(table.contains("until "));
        assert!(table.contains("old.com"));
        assert!(table.contains("Time expired"));
    }

    #[test]
    fn test_long_site_truncated() {
        let long = "a".repeat(80);
        let row = to_row(&BlockedSite::new(long, NOW + 1_000), NOW);
        assert_eq!(row.website.chars().count(), MAX_SITE_CHARS + 3);
    }

    #[test]
    fn test_format_clock_twelve_hour() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 15, 45, 0).unwrap();
        assert_eq!(format_clock(&time), "03:45 PM");

        let time = Utc.with_ymd_and_hms(2024, 5, 1, 9, 5, 0).unwrap();
        assert_eq!(format_clock(&time), "09:05 AM");
    }
}
