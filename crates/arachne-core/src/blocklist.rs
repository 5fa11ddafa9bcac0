use url::Url;

/// Hosts we refuse to scrape. Subdomains are covered: `m.facebook.com`
/// matches `facebook.com`.
const BLOCKED_HOSTS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "tiktok.com",
    "snapchat.com",
    "pinterest.com",
    "telegram.org",
    "whatsapp.com",
];

/// Returns true when the URL's host is on the blocklist.
pub fn is_url_blocked(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.strip_prefix("www.").unwrap_or(host).to_lowercase();

    BLOCKED_HOSTS
        .iter()
        .any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")))
}
