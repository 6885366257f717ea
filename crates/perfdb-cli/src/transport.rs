use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;

use perfdb_core::FormatTag;
use perfdb_import::ImportSummary;

/// `http://` and `https://` targets are servers; anything else is a local instance.
pub fn is_remote(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

fn content_type(format: &FormatTag) -> &'static str {
    match format.as_str() {
        FormatTag::JSON => "application/json",
        FormatTag::YAML => "application/yaml",
        _ => "application/octet-stream",
    }
}

pub fn submit_url(target: &str, format: &FormatTag, commit: bool) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(target).with_context(|| format!("parse submit url {target}"))?;
    url.query_pairs_mut()
        .append_pair("commit", if commit { "1" } else { "0" })
        .append_pair("format", format.as_str());
    Ok(url)
}

/// POST the raw report bytes; the server answers with an `ImportSummary`.
pub async fn submit(
    client: &reqwest::Client,
    target: &str,
    payload: Vec<u8>,
    format: &FormatTag,
    commit: bool,
) -> Result<ImportSummary> {
    let url = submit_url(target, format, commit)?;
    tracing::debug!(url = %url, bytes = payload.len(), "posting report");
    let summary: ImportSummary = client
        .post(url)
        .header(CONTENT_TYPE, content_type(format))
        .body(payload)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
        .context("parse server import summary")?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_targets_are_urls() {
        assert!(is_remote("http://perf.example.com/db_default/submitRun"));
        assert!(is_remote("https://perf.example.com/submit"));
        assert!(!is_remote("./instances/nightly"));
        assert!(!is_remote("/srv/perfdb"));
    }

    #[test]
    fn url_carries_commit_flag() {
        let url = submit_url("http://localhost:8000/submitRun", &FormatTag::json(), true).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/submitRun?commit=1&format=json");
        let url = submit_url("http://localhost:8000/submitRun?db=main", &FormatTag::yaml(), false).unwrap();
        assert_eq!(url.query(), Some("db=main&commit=0&format=yaml"));
    }
}
