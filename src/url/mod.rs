//! URL handling module for the QA crawler
//!
//! Canonical page URLs are rewritten onto the control and experimental hosts
//! before crawling, and navigation URLs get the configured query parameters.

use std::collections::BTreeMap;
use url::{ParseError, Url};

/// Rewrites a canonical URL onto an environment host
///
/// The path and query of `canonical` are kept and appended to `host`. A
/// canonical value that is already a bare path (`/express/pricing`) is
/// appended as is.
///
/// # Examples
///
/// ```
/// use qa_crawler::url::to_environment_url;
///
/// let url = to_environment_url(
///     "https://www.example.com/express/pricing?plan=pro",
///     "https://main--site.example",
/// )
/// .unwrap();
/// assert_eq!(url, "https://main--site.example/express/pricing?plan=pro");
/// ```
pub fn to_environment_url(canonical: &str, host: &str) -> Result<String, ParseError> {
    let canonical = canonical.trim();
    let host = host.trim().trim_end_matches('/');

    let location = if canonical.starts_with('/') {
        canonical.to_string()
    } else {
        let parsed = Url::parse(canonical)?;
        match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        }
    };

    let rewritten = Url::parse(&format!("{}{}", host, location))?;
    Ok(rewritten.to_string())
}

/// Merges query parameters into a URL
///
/// An existing parameter with the same key is replaced in place; new keys are
/// appended in the order given.
///
/// # Examples
///
/// ```
/// use qa_crawler::url::with_query_params;
/// use std::collections::BTreeMap;
///
/// let params = BTreeMap::from([("martech".to_string(), "off".to_string())]);
/// let url = with_query_params("https://main--site.example/express/?a=1", &params).unwrap();
/// assert_eq!(url.as_str(), "https://main--site.example/express/?a=1&martech=off");
/// ```
pub fn with_query_params(url: &str, params: &BTreeMap<String, String>) -> Result<Url, ParseError> {
    let mut url = Url::parse(url)?;
    if params.is_empty() {
        return Ok(url);
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    for (key, value) in params {
        match pairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value.clone(),
            None => pairs.push((key.clone(), value.clone())),
        }
    }

    url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    Ok(url)
}
