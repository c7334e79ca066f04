//! Auto-discovery: turns the `gbfs.json` root into per-language feed sets.

use reqwest::Url;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::LanguageFallback;
use crate::error::DiscoveryError;
use crate::fetch::{FeedFetcher, HttpClient};
use crate::model::{FeedDescriptor, FeedKind};

/// Feed descriptors grouped by IETF language tag, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSets {
    sets: Vec<(String, Vec<FeedDescriptor>)>,
}

impl FeedSets {
    /// Parses a discovery document.
    ///
    /// Accepts both the bare `{lang: {feeds: [...]}}` form and the enveloped
    /// `{last_updated, ttl, data: {lang: ...}}` form. Relative feed URLs are
    /// resolved against `base` when given.
    pub fn parse(bytes: &[u8], base: Option<&Url>) -> Result<Self, DiscoveryError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DiscoveryError::Json(e.to_string()))?;

        let Value::Object(root) = value else {
            return Err(DiscoveryError::Shape("root is not an object".into()));
        };
        let languages = unwrap_envelope(&root)?;

        let mut sets = Vec::with_capacity(languages.len());
        for (language, entry) in languages {
            let feeds = entry
                .get("feeds")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    DiscoveryError::Shape(format!("language {language:?} has no feeds array"))
                })?;

            let mut descriptors: Vec<FeedDescriptor> = Vec::with_capacity(feeds.len());
            for (i, feed) in feeds.iter().enumerate() {
                let field = |key: &str| {
                    feed.get(key).and_then(Value::as_str).ok_or_else(|| {
                        DiscoveryError::Shape(format!("{language}.feeds[{i}] missing {key}"))
                    })
                };
                let name = field("name")?;
                let url = field("url")?;

                let Ok(kind) = name.parse::<FeedKind>() else {
                    debug!(language = %language, name, "Skipping unrecognised feed");
                    continue;
                };
                if descriptors.iter().any(|d| d.name == kind) {
                    warn!(language = %language, feed = %kind, "Duplicate feed entry ignored");
                    continue;
                }

                descriptors.push(FeedDescriptor {
                    name: kind,
                    url: resolve_url(base, url),
                    language: language.clone(),
                });
            }
            sets.push((language.clone(), descriptors));
        }

        if sets.is_empty() {
            return Err(DiscoveryError::NoLanguages);
        }
        Ok(Self { sets })
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().map(|(lang, _)| lang.as_str())
    }

    pub fn get(&self, language: &str) -> Option<&[FeedDescriptor]> {
        self.sets
            .iter()
            .find(|(lang, _)| lang == language)
            .map(|(_, feeds)| feeds.as_slice())
    }

    /// Picks the feed set to ingest.
    ///
    /// The preferred language wins when present (exact, then
    /// case-insensitive match). Otherwise `fallback` decides: `First` takes
    /// the first language in document order, `Strict` fails.
    pub fn select(
        &self,
        preferred: Option<&str>,
        fallback: LanguageFallback,
    ) -> Result<(&str, &[FeedDescriptor]), DiscoveryError> {
        if let Some(wanted) = preferred {
            let found = self
                .sets
                .iter()
                .find(|(lang, _)| lang == wanted)
                .or_else(|| {
                    self.sets
                        .iter()
                        .find(|(lang, _)| lang.eq_ignore_ascii_case(wanted))
                });
            if let Some((lang, feeds)) = found {
                return Ok((lang.as_str(), feeds.as_slice()));
            }
            if fallback == LanguageFallback::Strict {
                return Err(DiscoveryError::LanguageNotFound(wanted.to_string()));
            }
            warn!(preferred = wanted, "Preferred language not published, using first listed");
        }

        let (lang, feeds) = self.sets.first().ok_or(DiscoveryError::NoLanguages)?;
        Ok((lang.as_str(), feeds.as_slice()))
    }
}

fn unwrap_envelope(root: &Map<String, Value>) -> Result<&Map<String, Value>, DiscoveryError> {
    let enveloped = root.contains_key("last_updated") || root.contains_key("ttl");
    match root.get("data") {
        Some(Value::Object(data)) if enveloped => Ok(data),
        Some(_) if enveloped => Err(DiscoveryError::Shape("data is not an object".into())),
        None if enveloped => Err(DiscoveryError::Shape("envelope has no data".into())),
        _ => Ok(root),
    }
}

fn resolve_url(base: Option<&Url>, url: &str) -> String {
    match (Url::parse(url), base) {
        (Ok(absolute), _) => absolute.to_string(),
        (Err(_), Some(base)) => base
            .join(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string()),
        (Err(_), None) => url.to_string(),
    }
}

/// Fetches and parses the auto-discovery root at `root_url`.
#[tracing::instrument(skip_all, fields(url = %root_url))]
pub async fn resolve<C: HttpClient>(
    fetcher: &FeedFetcher<C>,
    root_url: &str,
) -> Result<FeedSets, DiscoveryError> {
    let bytes = fetcher.fetch_bytes(root_url).await?;
    let base = Url::parse(root_url).ok();
    let sets = FeedSets::parse(&bytes, base.as_ref())?;

    info!(
        languages = ?sets.languages().collect::<Vec<_>>(),
        "Auto-discovery resolved"
    );
    Ok(sets)
}
