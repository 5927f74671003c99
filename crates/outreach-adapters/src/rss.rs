//! Short-timeout RSS email discovery. A directory search result that lacks
//! a contact email is a candidate for rejection; before dropping it, the
//! discovery fetcher asks this helper to fetch the feed itself and pull a
//! contact address out of `<managingEditor>`, `<webMaster>`, or
//! `<itunes:owner>/<itunes:email>` — in that order, first match wins.

use std::time::Duration;

use regex::Regex;

const RSS_EMAIL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RssEmailDiscovery {
    client: reqwest::Client,
}

impl Default for RssEmailDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl RssEmailDiscovery {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(RSS_EMAIL_TIMEOUT)
            .build()
            .expect("failed to build RSS email-discovery HTTP client");
        Self { client }
    }

    /// Fetches `feed_url` and returns the first valid contact email found,
    /// or `None` if the feed has none (a network failure is also `None` —
    /// this helper never blocks the pipeline).
    pub async fn discover(&self, feed_url: &str) -> Option<String> {
        let body = match self
            .client
            .get(feed_url)
            .header("User-Agent", "outreach-pipeline/0.1")
            .send()
            .await
        {
            Ok(resp) => match resp.text().await {
                Ok(text) => text,
                Err(_) => return None,
            },
            Err(_) => return None,
        };
        extract_contact_email(&body)
    }
}

/// Pure extraction over raw feed XML, factored out so it's testable without
/// network access.
pub fn extract_contact_email(xml: &str) -> Option<String> {
    for (tag, is_attr) in [
        ("managingEditor", false),
        ("webMaster", false),
        ("itunes:email", false),
    ] {
        if let Some(email) = extract_tag_text(xml, tag, is_attr).and_then(|t| first_email(&t)) {
            return Some(email);
        }
    }
    None
}

fn extract_tag_text(xml: &str, tag: &str, _is_attr: bool) -> Option<String> {
    let pattern = format!(r"<{tag}[^>]*>([^<]*)</{tag}>");
    let re = Regex::new(&pattern).ok()?;
    re.captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn first_email(text: &str) -> Option<String> {
    let re = Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").ok()?;
    re.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_managing_editor_email() {
        let xml = r#"<rss><channel><managingEditor>jane@example.com (Jane Doe)</managingEditor></channel></rss>"#;
        assert_eq!(extract_contact_email(xml), Some("jane@example.com".to_string()));
    }

    #[test]
    fn falls_back_to_webmaster() {
        let xml = r#"<rss><channel><webMaster>webmaster@example.com</webMaster></channel></rss>"#;
        assert_eq!(
            extract_contact_email(xml),
            Some("webmaster@example.com".to_string())
        );
    }

    #[test]
    fn falls_back_to_itunes_owner_email() {
        let xml = r#"<rss><channel><itunes:owner><itunes:name>Jane</itunes:name><itunes:email>owner@example.com</itunes:email></itunes:owner></channel></rss>"#;
        assert_eq!(
            extract_contact_email(xml),
            Some("owner@example.com".to_string())
        );
    }

    #[test]
    fn returns_none_when_no_email_present() {
        let xml = r#"<rss><channel><title>No contact here</title></channel></rss>"#;
        assert_eq!(extract_contact_email(xml), None);
    }

    #[test]
    fn prefers_managing_editor_over_webmaster() {
        let xml = r#"<rss><channel>
            <managingEditor>editor@example.com</managingEditor>
            <webMaster>webmaster@example.com</webMaster>
        </channel></rss>"#;
        assert_eq!(extract_contact_email(xml), Some("editor@example.com".to_string()));
    }
}
