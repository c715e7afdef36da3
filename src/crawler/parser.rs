//! HTML parser for extracting page artifacts
//!
//! This module handles parsing rendered HTML to extract:
//! - Source files (block scripts the page loads)
//! - Content blocks inside the `.section` elements of `main`, keyed by a hash of their classes

use crate::model::ContentBlock;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

/// Artifacts extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageArtifacts {
    /// Absolute URLs of matching source files
    pub source_files: BTreeSet<String>,

    /// Content blocks keyed by content hash
    pub blocks: BTreeMap<String, ContentBlock>,
}

/// Parses HTML content and extracts the page's artifacts
///
/// # Source Files
///
/// `<script src>` and `<link href>` references are resolved against
/// `base_url`; those whose path ends in `.js` and whose URL contains
/// `source_file_pattern` are kept.
///
/// # Blocks
///
/// For every `.section` element at any depth inside the page's first `main`,
/// each direct child element with at least one class is a block. If one of the child's classes
/// ends in `-wrapper`, its direct `div` children with classes are blocks too.
/// Every block found is attributed to `page_url`.
///
/// # Example
///
/// ```no_run
/// use qa_crawler::crawler::extract_artifacts;
/// use url::Url;
///
/// let html = r#"<main><div class="section"><div class="hero dark"></div></div></main>"#;
/// let base = Url::parse("https://main--site.example/express/").unwrap();
/// let artifacts = extract_artifacts(html, &base, "https://www.example.com/express/", "/blocks/");
/// assert_eq!(artifacts.blocks.len(), 1);
/// ```
pub fn extract_artifacts(
    html: &str,
    base_url: &Url,
    page_url: &str,
    source_file_pattern: &str,
) -> PageArtifacts {
    let document = Html::parse_document(html);

    PageArtifacts {
        source_files: extract_source_files(&document, base_url, source_file_pattern),
        blocks: extract_blocks(&document, page_url),
    }
}

fn extract_source_files(document: &Html, base_url: &Url, pattern: &str) -> BTreeSet<String> {
    let mut files = BTreeSet::new();

    let references = [("script[src]", "src"), ("link[href]", "href")];
    for (selector, attr) in references {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };

        for element in document.select(&selector) {
            let Some(reference) = element.value().attr(attr) else {
                continue;
            };

            if let Some(file) = resolve_source_file(reference, base_url, pattern) {
                files.insert(file);
            }
        }
    }

    files
}

/// Resolves a script reference and keeps it only if it is a matching `.js` file
fn resolve_source_file(reference: &str, base_url: &Url, pattern: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with("data:") {
        return None;
    }

    let absolute = base_url.join(reference).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }

    if absolute.path().ends_with(".js") && absolute.as_str().contains(pattern) {
        Some(absolute.to_string())
    } else {
        None
    }
}

fn extract_blocks(document: &Html, page_url: &str) -> BTreeMap<String, ContentBlock> {
    let mut blocks = BTreeMap::new();

    let (Ok(main_selector), Ok(section_selector)) =
        (Selector::parse("main"), Selector::parse(".section"))
    else {
        return blocks;
    };

    let Some(main) = document.select(&main_selector).next() else {
        return blocks;
    };

    for section in main.select(&section_selector) {
        for child in section.children().filter_map(ElementRef::wrap) {
            let class_names = class_names_of(&child);
            if class_names.is_empty() {
                continue;
            }

            let is_wrapper = class_names.iter().any(|c| c.ends_with("-wrapper"));
            add_block(&mut blocks, class_names, page_url);

            if is_wrapper {
                for inner in child.children().filter_map(ElementRef::wrap) {
                    if inner.value().name() != "div" {
                        continue;
                    }
                    let inner_classes = class_names_of(&inner);
                    if !inner_classes.is_empty() {
                        add_block(&mut blocks, inner_classes, page_url);
                    }
                }
            }
        }
    }

    blocks
}

fn class_names_of(element: &ElementRef<'_>) -> Vec<String> {
    element.value().classes().map(str::to_string).collect()
}

fn add_block(blocks: &mut BTreeMap<String, ContentBlock>, class_names: Vec<String>, page_url: &str) {
    let hash = block_hash(&class_names);
    blocks
        .entry(hash)
        .or_insert_with(|| ContentBlock::new(class_names, Vec::<String>::new()))
        .urls
        .insert(page_url.to_string());
}

/// Hex SHA-256 of the sorted class names joined by a single space
pub fn block_hash(class_names: &[String]) -> String {
    let mut sorted: Vec<&str> = class_names.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(sorted.join(" ").as_bytes());
    hex::encode(hasher.finalize())
}
