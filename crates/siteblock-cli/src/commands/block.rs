//! Block, unblock and check command handlers

use anyhow::Result;
use siteblock_core::ipc::{IpcClient, IpcRequest, IpcResponse};
use thiserror::Error;

use super::list::show_list;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("Please set a valid website and duration.")]
    Invalid,
}

/// Raw input of the add-block form, exactly as typed
#[derive(Debug, Clone, Copy)]
pub struct BlockForm<'a> {
    pub site: &'a str,
    pub hours: &'a str,
    pub minutes: &'a str,
}

/// A validated block request, ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSubmission {
    pub website: String,
    /// Minutes
    pub duration: i64,
}

impl BlockForm<'_> {
    /// Reject an empty site, a zero total duration, or a non-numeric field
    ///
    /// # Errors
    ///
    /// Returns `FormError::Invalid` when the form cannot be submitted
    pub fn validate(&self) -> Result<BlockSubmission, FormError> {
        let website = self.site.trim();
        let hours = parse_field(self.hours).ok_or(FormError::Invalid)?;
        let minutes = parse_field(self.minutes).ok_or(FormError::Invalid)?;

        if website.is_empty() || (hours == 0 && minutes == 0) {
            return Err(FormError::Invalid);
        }

        let duration = hours
            .checked_mul(60)
            .and_then(|h| h.checked_add(minutes))
            .ok_or(FormError::Invalid)?;

        Ok(BlockSubmission {
            website: website.to_string(),
            duration,
        })
    }
}

/// Blank counts as zero
fn parse_field(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    raw.parse().ok()
}

pub async fn block_command(
    client: &IpcClient,
    site: &str,
    hours: &str,
    minutes: &str,
) -> Result<()> {
    let submission = BlockForm {
        site,
        hours,
        minutes,
    }
    .validate()?;

    client
        .block(&submission.website, submission.duration)
        .await?;
    println!(
        "Blocked {} for {} minutes",
        submission.website, submission.duration
    );

    show_list(client).await
}

pub async fn unblock_command(client: &IpcClient, site: &str) -> Result<()> {
    client.unblock(site).await?;
    println!("Unblocked {site}");
    show_list(client).await
}

pub async fn check_command(client: &IpcClient, url: &str) -> Result<()> {
    let request = IpcRequest::CheckUrl {
        url: url.to_string(),
    };
    match client.send_command(&request).await? {
        IpcResponse::Check {
            blocked: true,
            rule_id,
        } => {
            let rule = rule_id.map_or_else(|| "?".to_string(), |id| id.to_string());
            println!("{url} is blocked (rule {rule})");
        }
        IpcResponse::Check { blocked: false, .. } => println!("{url} is allowed"),
        other => anyhow::bail!("Unexpected response from daemon: {other:?}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form<'a>(site: &'a str, hours: &'a str, minutes: &'a str) -> BlockForm<'a> {
        BlockForm {
            site,
            hours,
            minutes,
        }
    }

    #[test]
    fn test_valid_form() {
        assert_eq!(
            form(" example.com ", "1", "30").validate(),
            Ok(BlockSubmission {
                website: "example.com".to_string(),
                duration: 90
            })
        );
    }

    #[test]
    fn test_blank_fields_count_as_zero() {
        assert_eq!(form("a.com", "", "30").validate().unwrap().duration, 30);
        assert_eq!(form("a.com", "2", " ").validate().unwrap().duration, 120);
    }

    #[test]
    fn test_empty_site_rejected() {
        assert_eq!(form("   ", "1", "0").validate(), Err(FormError::Invalid));
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert_eq!(form("a.com", "0", "0").validate(), Err(FormError::Invalid));
        assert_eq!(form("a.com", "", "").validate(), Err(FormError::Invalid));
    }

    #[test]
    fn test_non_numeric_rejected() {
        assert_eq!(form("a.com", "one", "0").validate(), Err(FormError::Invalid));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            FormError::Invalid.to_string(),
            "Please set a valid website and duration."
        );
    }
}
