// src/ingest/feed.rs
use anyhow::{Context, Result};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "creator", alias = "dc:creator")]
    creator: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Atom {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<String>,
    title: Option<Text>,
    #[serde(default)]
    link: Vec<AtomLink>,
    updated: Option<String>,
    published: Option<String>,
    author: Option<AtomAuthor>,
    summary: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

/// Element text where the element may carry attributes (`<guid isPermaLink>`).
#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text")]
    value: Option<String>,
}

/// One feed entry in a shape shared by RSS 2.0 and Atom. Serialized as the
/// `raw` payload of the job it normalizes into.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_snippet: Option<String>,
}

/// Parse an RSS 2.0 or Atom document into entries.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);

    let entries = match from_str::<Rss>(&xml_clean) {
        Ok(rss) => rss.channel.item.into_iter().map(FeedEntry::from).collect(),
        Err(rss_err) => {
            let atom: Atom = from_str(&xml_clean)
                .map_err(|_| rss_err)
                .context("parsing rss/atom xml")?;
            atom.entry.into_iter().map(FeedEntry::from).collect()
        }
    };

    histogram!("ingest_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(entries)
}

impl From<RssItem> for FeedEntry {
    fn from(it: RssItem) -> Self {
        FeedEntry {
            guid: it.guid.and_then(|g| g.value),
            title: it.title,
            link: it.link,
            creator: it.creator,
            pub_date: it.pub_date,
            iso_date: None,
            content_snippet: it.description,
        }
    }
}

impl From<AtomEntry> for FeedEntry {
    fn from(e: AtomEntry) -> Self {
        let link = e
            .link
            .iter()
            .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
            .or_else(|| e.link.first())
            .and_then(|l| l.href.clone());
        FeedEntry {
            guid: e.id,
            title: e.title.and_then(|t| t.value),
            link,
            creator: e.author.and_then(|a| a.name),
            pub_date: e.published,
            iso_date: e.updated,
            content_snippet: e.summary.and_then(|s| s.value),
        }
    }
}

// HTML entities are not defined in XML; quick-xml rejects them.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
