// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Minimal atom feed reader for provider event feeds, which is how
//! out-of-band changes get turned into divergence marks: a poller reads
//! the feed, extracts the affected tenant from each entry and marks the
//! tenant's groups divergent.

use std::fmt;

use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedError(pub String);

impl std::error::Error for FeedError {}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Feed parse error: {}", self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub summary: String,
    pub categories: Vec<String>,
    pub updated: String,
    pub content: String,
}

impl FeedEntry {
    /// Category terms, optionally restricted to a prefix.
    pub fn categories(&self, prefix: Option<&str>) -> Vec<&str> {
        self.categories
            .iter()
            .map(String::as_str)
            .filter(|term| prefix.map_or(true, |prefix| term.starts_with(prefix)))
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Feed {
    pub entries: Vec<FeedEntry>,
    pub next_link: Option<String>,
    pub previous_link: Option<String>,
}

/// Parse an atom document, keeping per entry the summary, category
/// terms, updated timestamp and content, and at feed level the
/// pagination links.
pub fn parse(xml: &str) -> Result<Feed, FeedError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut feed = Feed::default();
    let mut current_entry: Option<FeedEntry> = None;
    let mut text_buffer = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "entry" => {
                        current_entry = Some(FeedEntry::default());
                    }
                    "category" => {
                        if let Some(entry) = current_entry.as_mut() {
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"term" {
                                    entry
                                        .categories
                                        .push(String::from_utf8_lossy(&attr.value).to_string());
                                }
                            }
                        }
                    }
                    "link" if current_entry.is_none() => {
                        let mut rel = String::new();
                        let mut href = String::new();
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"rel" => rel = String::from_utf8_lossy(&attr.value).to_string(),
                                b"href" => href = String::from_utf8_lossy(&attr.value).to_string(),
                                _ => {}
                            }
                        }
                        match rel.as_str() {
                            "next" => feed.next_link = Some(href),
                            "previous" => feed.previous_link = Some(href),
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                text_buffer = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "entry" => {
                        if let Some(entry) = current_entry.take() {
                            feed.entries.push(entry);
                        }
                    }
                    _ => {
                        if let Some(entry) = current_entry.as_mut() {
                            match name.as_str() {
                                "summary" => entry.summary = text_buffer.clone(),
                                "updated" => entry.updated = text_buffer.clone(),
                                "content" => entry.content = text_buffer.clone(),
                                _ => {}
                            }
                        }
                    }
                }
                text_buffer.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FeedError(e.to_string())),
            _ => {}
        }
    }

    Ok(feed)
}
