// src/ingest/robots.rs
//! Minimal robots.txt support: `User-agent` groups and `Disallow` prefixes.

use std::time::Duration;

use reqwest::Client;
use url::Url;

pub const ROBOTS_TIMEOUT: Duration = Duration::from_secs(5);

/// `Disallow` values from every stanza that applies to `user_agent`.
///
/// Each `User-agent` line decides on its own whether the following rules
/// apply: its token is `*` or contains `user_agent` (case-insensitive).
pub fn disallowed_paths(robots_txt: &str, user_agent: &str) -> Vec<String> {
    let ua = user_agent.trim().to_ascii_lowercase();
    let mut out = Vec::new();
    let mut applies = false;

    for line in robots_txt.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key.eq_ignore_ascii_case("user-agent") {
            let token = value.to_ascii_lowercase();
            applies = token == "*" || (!ua.is_empty() && token.contains(&ua));
            continue;
        }

        if applies && key.eq_ignore_ascii_case("disallow") && !value.is_empty() {
            out.push(value.to_string());
        }
    }
    out
}

/// True when `path` is not covered by any disallow rule.
pub fn path_allowed(path: &str, disallowed: &[String]) -> bool {
    let path = if path.is_empty() { "/" } else { path };
    !disallowed
        .iter()
        .any(|d| d == "/" || path.starts_with(d.as_str()))
}

/// Full check against `target`'s origin. Any fetch error or non-2xx
/// response allows everything.
pub async fn robots_allows(client: &Client, target: &Url, user_agent: &str) -> bool {
    let Some(host) = target.host_str() else {
        return true;
    };
    let origin = match target.port() {
        Some(port) => format!("{}://{}:{}", target.scheme(), host, port),
        None => format!("{}://{}", target.scheme(), host),
    };
    let robots_url = format!("{origin}/robots.txt");

    let body = match client
        .get(&robots_url)
        .timeout(ROBOTS_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => match resp.text().await {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!(error = %e, url = %robots_url, "robots body unreadable; allowing");
                return true;
            }
        },
        Ok(resp) => {
            tracing::debug!(status = %resp.status(), url = %robots_url, "no robots.txt; allowing");
            return true;
        }
        Err(e) => {
            tracing::debug!(error = %e, url = %robots_url, "robots fetch failed; allowing");
            return true;
        }
    };

    path_allowed(target.path(), &disallowed_paths(&body, user_agent))
}
