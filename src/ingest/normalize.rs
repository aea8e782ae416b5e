// src/ingest/normalize.rs
//! Dialect normalizers: raw upstream records → [`CanonicalJob`].
//!
//! Every normalizer is total. Missing or oddly-shaped fields become `None`,
//! never a panic. Field lookups walk a per-dialect alias chain and take the
//! first non-empty value.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::{Map, Value};

use crate::ingest::types::{CanonicalJob, Dialect, SourceType};

/// Clean a free-text field: decode entities, strip tags, fold whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Parse a date string into a UTC instant. Accepts RFC 3339, RFC 2822 and the
/// usual ATS variants (offset without colon, naive timestamps, bare dates).
/// Naive values are read as UTC.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// `YYYY-MM-DDTHH:MM:SS.mmmZ` for a parseable date, `None` otherwise.
pub fn safe_date_iso(s: &str) -> Option<String> {
    parse_datetime(s).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// [`safe_date_iso`] over a JSON value. Numbers are epoch milliseconds; `0`
/// means absent.
pub fn safe_date_iso_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => safe_date_iso(s),
        Value::Number(n) => {
            let ms = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            if ms == 0 {
                return None;
            }
            Utc.timestamp_millis_opt(ms)
                .single()
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        _ => None,
    }
}

/// How ids are minted for records that carry no natural identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdStrategy {
    /// `<source>-<uuid v4>`: unique within a run, not stable across runs.
    #[default]
    Random,
    /// `<source>-<sha256(source, title, company)[..12]>`: stable across runs.
    Hashed,
}

impl std::str::FromStr for IdStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(IdStrategy::Random),
            "hashed" => Ok(IdStrategy::Hashed),
            other => anyhow::bail!("unknown id strategy `{other}` (expected random|hashed)"),
        }
    }
}

impl IdStrategy {
    pub fn synthesize(&self, source: &str, title: Option<&str>, company: Option<&str>) -> String {
        let prefix = if source.trim().is_empty() {
            "job"
        } else {
            source.trim()
        };
        match self {
            IdStrategy::Random => format!("{prefix}-{}", uuid::Uuid::new_v4()),
            IdStrategy::Hashed => {
                use sha2::{Digest, Sha256};
                let mut hasher = Sha256::new();
                hasher.update(source.as_bytes());
                hasher.update([0x1f]);
                hasher.update(title.unwrap_or_default().as_bytes());
                hasher.update([0x1f]);
                hasher.update(company.unwrap_or_default().as_bytes());
                let digest = hasher.finalize();
                let mut out = String::with_capacity(prefix.len() + 13);
                out.push_str(prefix);
                out.push('-');
                for b in digest.iter().take(6) {
                    use std::fmt::Write as _;
                    let _ = write!(&mut out, "{:02x}", b);
                }
                out
            }
        }
    }
}

/// Dispatches raw records to the normalizer of their dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizerRegistry {
    ids: IdStrategy,
}

impl NormalizerRegistry {
    pub fn new(ids: IdStrategy) -> Self {
        Self { ids }
    }

    pub fn id_strategy(&self) -> IdStrategy {
        self.ids
    }

    pub fn normalize(
        &self,
        raw: &Value,
        source_name: &str,
        source_type: SourceType,
        dialect: Dialect,
    ) -> CanonicalJob {
        self.normalize_at(raw, source_name, source_type, dialect, Utc::now())
    }

    pub fn normalize_at(
        &self,
        raw: &Value,
        source_name: &str,
        source_type: SourceType,
        dialect: Dialect,
        crawl_time: DateTime<Utc>,
    ) -> CanonicalJob {
        let empty = Value::Object(Map::new());
        let item = if raw.is_object() { raw } else { &empty };

        let fields = match dialect {
            Dialect::Greenhouse => greenhouse(item),
            Dialect::Workable => workable(item),
            Dialect::Zoho => zoho(item),
            Dialect::Lever => lever(item),
            Dialect::GenericApi => generic_api(item),
            Dialect::Rss => rss(item, source_name),
            Dialect::Scraped => scraped(item),
        };

        let id = fields.id.unwrap_or_else(|| {
            self.ids.synthesize(
                source_name,
                fields.title.as_deref(),
                fields.company.as_deref(),
            )
        });

        CanonicalJob {
            id,
            title: fields.title,
            company: fields.company,
            location: fields.location,
            url: fields.url,
            posted_at: fields.posted_at,
            source: source_name.to_string(),
            source_type,
            crawl_time,
            raw: raw.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Fields {
    id: Option<String>,
    title: Option<String>,
    company: Option<String>,
    location: Option<String>,
    url: Option<String>,
    posted_at: Option<String>,
}

/// Dotted lookup (`categories.location`).
fn lookup<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(item, |cur, key| cur.get(key))
}

fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_str(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| lookup(item, k).and_then(scalar))
}

fn first_text(item: &Value, keys: &[&str]) -> Option<String> {
    first_str(item, keys)
        .map(|s| clean_text(&s))
        .filter(|s| !s.is_empty())
}

fn first_date(item: &Value, keys: &[&str]) -> Option<String> {
    // The first present value decides; an unparseable date does not fall
    // through to later aliases.
    keys.iter()
        .find_map(|k| lookup(item, k).filter(|v| scalar(v).is_some()))
        .and_then(safe_date_iso_value)
}

/// Flatten a location value into one display string.
fn flatten_location(v: &Value) -> Option<String> {
    let out = match v {
        Value::String(_) | Value::Number(_) => scalar(v).map(|s| clean_text(&s)),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(flatten_location).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(map) => {
            if let Some(name) = ["name", "location", "text"]
                .iter()
                .find_map(|k| map.get(*k).and_then(scalar))
            {
                Some(clean_text(&name))
            } else {
                let parts: Vec<String> = ["city", "region", "state", "country"]
                    .iter()
                    .filter_map(|k| map.get(*k).and_then(scalar))
                    .collect();
                if !parts.is_empty() {
                    Some(parts.join(", "))
                } else if map.is_empty() {
                    None
                } else {
                    Some(Value::Object(map.clone()).to_string())
                }
            }
        }
        _ => None,
    };
    out.filter(|s| !s.is_empty())
}

fn first_location(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| lookup(item, k).and_then(flatten_location))
}

fn greenhouse(item: &Value) -> Fields {
    Fields {
        id: first_str(item, &["id", "name", "absolute_url"]),
        title: first_text(item, &["title", "name"]),
        company: first_text(item, &["company"]),
        location: first_location(item, &["location"]),
        url: first_str(item, &["absolute_url", "url", "apply_url"]),
        posted_at: first_date(
            item,
            &["updated_at", "posted_at", "created_at", "offered_at"],
        ),
    }
}

fn workable(item: &Value) -> Fields {
    let location = item
        .get("locations")
        .filter(|v| v.as_array().is_some_and(|a| !a.is_empty()))
        .and_then(flatten_location)
        .or_else(|| first_location(item, &["location", "city"]));
    Fields {
        id: first_str(item, &["id", "job_id", "key"]),
        title: first_text(item, &["title", "position"]),
        company: first_text(item, &["company", "employer"]),
        location,
        url: first_str(item, &["apply_url", "url", "shortlink"]),
        posted_at: first_date(
            item,
            &[
                "published_at",
                "published_at_local",
                "created",
                "created_at",
                "posted_at",
            ],
        ),
    }
}

fn zoho(item: &Value) -> Fields {
    Fields {
        id: first_str(item, &["id", "job_id", "Id"]),
        title: first_text(item, &["Job_Title", "job_title", "title", "JobTitle"]),
        company: first_text(item, &["Company", "company"]),
        location: first_location(
            item,
            &["Job_Location", "job_location", "location", "city"],
        ),
        url: first_str(item, &["apply_url", "url", "JobURL"]),
        posted_at: first_date(
            item,
            &["created_time", "created_at", "posted_at", "published_at"],
        ),
    }
}

fn lever(item: &Value) -> Fields {
    Fields {
        id: first_str(item, &["id", "requisitionId", "uuid"]),
        title: first_text(item, &["text", "title", "role"]),
        company: first_text(item, &["company"]),
        location: first_location(
            item,
            &[
                "categories.location",
                "categories.locationGroup",
                "location",
            ],
        ),
        url: first_str(item, &["hostedUrl", "applyUrl", "apply_url", "href"]),
        posted_at: first_date(
            item,
            &["createdAt", "created_at", "posted_at", "publishDate"],
        ),
    }
}

fn generic_api(item: &Value) -> Fields {
    Fields {
        id: first_str(item, &["id", "job_id", "uuid", "url", "link"]),
        title: first_text(item, &["title", "jobTitle", "position", "text"]),
        company: first_text(item, &["company", "organization", "employer"]),
        location: first_location(item, &["location", "city", "region"]),
        url: first_str(item, &["url", "apply_url", "link"]),
        posted_at: first_date(
            item,
            &["posted_at", "created_at", "date", "pubDate", "posted"],
        ),
    }
}

fn rss(item: &Value, source_name: &str) -> Fields {
    let title = first_text(item, &["title"]);
    let id = first_str(item, &["guid", "link"])
        .or_else(|| title.as_ref().map(|t| format!("{source_name}-{t}")));
    Fields {
        id,
        title,
        company: first_text(item, &["creator"]),
        location: None,
        url: first_str(item, &["link"]),
        posted_at: first_date(item, &["pubDate", "isoDate"]),
    }
}

fn scraped(item: &Value) -> Fields {
    Fields {
        id: first_str(item, &["url"]),
        title: first_text(item, &["title"]),
        company: first_text(item, &["company"]),
        location: first_location(item, &["location"]),
        url: first_str(item, &["url"]),
        posted_at: first_date(item, &["posted_at"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn norm(raw: Value, dialect: Dialect) -> CanonicalJob {
        NormalizerRegistry::default().normalize(&raw, "acme", SourceType::Api, dialect)
    }

    #[test]
    fn safe_date_iso_rejects_garbage() {
        assert_eq!(safe_date_iso("not-a-date"), None);
        assert_eq!(safe_date_iso(""), None);
        assert_eq!(safe_date_iso("2024-13-45"), None);
    }

    #[test]
    fn safe_date_iso_keeps_the_instant() {
        assert_eq!(
            safe_date_iso("2024-01-15T10:00:00Z").as_deref(),
            Some("2024-01-15T10:00:00.000Z")
        );
        assert_eq!(
            safe_date_iso("2024-01-15T12:00:00+02:00").as_deref(),
            Some("2024-01-15T10:00:00.000Z")
        );
        assert_eq!(
            safe_date_iso("Mon, 15 Jan 2024 10:00:00 GMT").as_deref(),
            Some("2024-01-15T10:00:00.000Z")
        );
        assert_eq!(
            safe_date_iso("2024-01-15T10:00:00.000+0000").as_deref(),
            Some("2024-01-15T10:00:00.000Z")
        );
        assert_eq!(
            safe_date_iso("2024-01-15").as_deref(),
            Some("2024-01-15T00:00:00.000Z")
        );
    }

    #[test]
    fn epoch_millis_numbers_are_dates() {
        assert_eq!(
            safe_date_iso_value(&json!(1705312800000_i64)).as_deref(),
            Some("2024-01-15T10:00:00.000Z")
        );
        assert_eq!(safe_date_iso_value(&json!(true)), None);
    }

    #[test]
    fn zero_epoch_is_no_date() {
        assert_eq!(safe_date_iso_value(&json!(0)), None);
        assert_eq!(safe_date_iso_value(&json!(0.0)), None);
        assert_eq!(
            safe_date_iso_value(&json!(1)).as_deref(),
            Some("1970-01-01T00:00:00.001Z")
        );
    }

    #[test]
    fn every_normalizer_is_total_on_empty_object() {
        let reg = NormalizerRegistry::default();
        for dialect in Dialect::all() {
            for raw in [json!({}), json!(null), json!("x"), json!([1, 2])] {
                let job = reg.normalize(&raw, "acme", SourceType::Api, dialect);
                assert!(!job.id.is_empty(), "{dialect:?}");
                assert!(job.title.is_none());
                assert!(job.company.is_none());
                assert!(job.location.is_none());
                assert!(job.url.is_none());
                assert!(job.posted_at.is_none());
            }
        }
    }

    #[test]
    fn synthesized_ids_differ_within_a_run() {
        let a = norm(json!({}), Dialect::GenericApi);
        let b = norm(json!({}), Dialect::GenericApi);
        assert!(a.id.starts_with("acme-"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn hashed_ids_are_stable() {
        let reg = NormalizerRegistry::new(IdStrategy::Hashed);
        let raw = json!({"title": "Engineer", "company": "Acme"});
        let a = reg.normalize(&raw, "acme", SourceType::Api, Dialect::GenericApi);
        let b = reg.normalize(&raw, "acme", SourceType::Api, Dialect::GenericApi);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), "acme-".len() + 12);
    }

    #[test]
    fn greenhouse_fields() {
        let job = norm(
            json!({
                "id": 4012345,
                "title": "Backend Engineer",
                "location": {"name": "Berlin"},
                "absolute_url": "https://boards.greenhouse.io/acme/jobs/4012345",
                "updated_at": "2024-03-01T09:30:00-05:00"
            }),
            Dialect::Greenhouse,
        );
        assert_eq!(job.id, "4012345");
        assert_eq!(job.title.as_deref(), Some("Backend Engineer"));
        assert_eq!(job.location.as_deref(), Some("Berlin"));
        assert_eq!(
            job.url.as_deref(),
            Some("https://boards.greenhouse.io/acme/jobs/4012345")
        );
        assert_eq!(job.posted_at.as_deref(), Some("2024-03-01T14:30:00.000Z"));
    }

    #[test]
    fn workable_joins_locations() {
        let job = norm(
            json!({
                "shortcode": "AB12",
                "position": "Designer",
                "locations": [{"name": "Lisbon"}, "Remote", {"city": "Porto", "country": "PT"}],
                "shortlink": "https://apply.workable.com/j/AB12",
                "published_at": "2024-02-10"
            }),
            Dialect::Workable,
        );
        assert_eq!(job.title.as_deref(), Some("Designer"));
        assert_eq!(job.location.as_deref(), Some("Lisbon, Remote, Porto, PT"));
        assert_eq!(job.url.as_deref(), Some("https://apply.workable.com/j/AB12"));
        assert_eq!(job.posted_at.as_deref(), Some("2024-02-10T00:00:00.000Z"));
    }

    #[test]
    fn zoho_prefers_capitalized_keys() {
        let job = norm(
            json!({
                "Id": "z-1",
                "Job_Title": "Accountant",
                "job_title": "ignored",
                "Job_Location": "Chennai",
                "JobURL": "https://careers.zoho.example/1",
                "created_time": "2024-01-02 08:00:00"
            }),
            Dialect::Zoho,
        );
        assert_eq!(job.id, "z-1");
        assert_eq!(job.title.as_deref(), Some("Accountant"));
        assert_eq!(job.location.as_deref(), Some("Chennai"));
        assert_eq!(job.posted_at.as_deref(), Some("2024-01-02T08:00:00.000Z"));
    }

    #[test]
    fn lever_reads_categories_and_epoch_dates() {
        let job = norm(
            json!({
                "id": "lev-9",
                "text": "SRE",
                "categories": {"location": "Toronto", "team": "Infra"},
                "hostedUrl": "https://jobs.lever.co/acme/lev-9",
                "createdAt": 1705312800000_i64
            }),
            Dialect::Lever,
        );
        assert_eq!(job.title.as_deref(), Some("SRE"));
        assert_eq!(job.location.as_deref(), Some("Toronto"));
        assert_eq!(job.posted_at.as_deref(), Some("2024-01-15T10:00:00.000Z"));
    }

    #[test]
    fn generic_alias_chain_first_non_empty_wins() {
        let job = norm(
            json!({
                "title": "",
                "jobTitle": "  Data &amp; ML Engineer ",
                "organization": "Acme",
                "link": "https://acme.example/jobs/7",
                "date": "not a date"
            }),
            Dialect::GenericApi,
        );
        assert_eq!(job.title.as_deref(), Some("Data & ML Engineer"));
        assert_eq!(job.company.as_deref(), Some("Acme"));
        assert_eq!(job.id, "https://acme.example/jobs/7");
        assert_eq!(job.url.as_deref(), Some("https://acme.example/jobs/7"));
        assert_eq!(job.posted_at, None);
    }

    #[test]
    fn rss_falls_back_to_title_id() {
        let job = NormalizerRegistry::default().normalize(
            &json!({"title": "Writer", "creator": "Acme", "pubDate": "Tue, 16 Jan 2024 08:00:00 +0000"}),
            "feed",
            SourceType::Rss,
            Dialect::Rss,
        );
        assert_eq!(job.id, "feed-Writer");
        assert_eq!(job.company.as_deref(), Some("Acme"));
        assert_eq!(job.location, None);
        assert_eq!(job.source_type, SourceType::Rss);
    }

    #[test]
    fn clean_text_strips_markup() {
        assert_eq!(clean_text("<b>Senior</b>&nbsp;\n Engineer "), "Senior Engineer");
        assert_eq!(clean_text("   "), "");
    }

    #[test]
    fn id_strategy_parses() {
        assert_eq!("Hashed".parse::<IdStrategy>().unwrap(), IdStrategy::Hashed);
        assert!("sequential".parse::<IdStrategy>().is_err());
    }
}
