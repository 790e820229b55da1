use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use tracing::{info, warn};

/// What happened to the optional webhook upload. Never an error for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Skipped(&'static str),
    Sent { status: u16 },
    Failed(String),
}

impl UploadStatus {
    pub fn describe(&self) -> String {
        match self {
            UploadStatus::Skipped(why) => format!("skipped ({})", why),
            UploadStatus::Sent { status } => format!("sent (HTTP {})", status),
            UploadStatus::Failed(why) => format!("failed: {}", why),
        }
    }
}

/// POSTs `path` as multipart field `file`. Failures are logged and returned.
pub fn upload(path: &Path, webhook_url: Option<&str>, timeout: Duration) -> UploadStatus {
    let Some(url) = webhook_url.filter(|u| !u.trim().is_empty()) else {
        return UploadStatus::Skipped("no webhook_url configured");
    };

    match send(path, url, timeout) {
        Ok(status) => {
            info!(path = %path.display(), status, "uploaded export");
            UploadStatus::Sent { status }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "upload failed");
            UploadStatus::Failed(e.to_string())
        }
    }
}

fn send(path: &Path, url: &str, timeout: Duration) -> anyhow::Result<u16> {
    let client = Client::builder().timeout(timeout).build()?;
    let form = multipart::Form::new().file("file", path)?;
    let resp = client.post(url).multipart(form).send()?.error_for_status()?;
    Ok(resp.status().as_u16())
}
