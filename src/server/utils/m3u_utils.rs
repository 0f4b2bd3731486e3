// extended m3u parsing, turns playlist text into Channel records
//
// only the bits iptv-org playlists actually use are handled: #EXTINF lines with key="value"
// attributes and a title after the comma, followed at some point by the stream url
use std::collections::HashMap;

use tracing::debug;

use crate::playlist::Channel;

const EXTINF: &str = "#EXTINF";
const UNKNOWN_TITLE: &str = "Unknown";

/// a parsed `#EXTINF` line
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtInf {
    pub attributes: HashMap<String, String>,
    pub title: String,
}

impl ExtInf {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// title after the comma, then tvg-name, then "Unknown"
    pub fn display_title(&self) -> String {
        if !self.title.is_empty() {
            return self.title.clone();
        }
        self.attribute("tvg-name")
            .unwrap_or(UNKNOWN_TITLE)
            .to_string()
    }

    pub fn into_channel(self, url: &str) -> Channel {
        Channel {
            title: self.display_title(),
            url: url.to_string(),
            logo: self.attribute("tvg-logo").unwrap_or_default().to_string(),
            group: self.attribute("group-title").unwrap_or_default().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrState {
    SeekingKey,
    // just saw '=', the next char decides quoted or not
    ValueStart,
    QuotedValue,
    UnquotedValue,
}

/// pulls key="value" and key=value pairs out of the part of an #EXTINF line before the title
///
/// keys start after the last space or colon before the '=', so the `#EXTINF:-1` prefix never
/// turns into a key. an unterminated quote stops collection, whatever was read before it is kept
pub fn parse_attributes(segment: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut state = AttrState::SeekingKey;
    let mut key = String::new();
    let mut value = String::new();

    for c in segment.chars() {
        match state {
            AttrState::SeekingKey => match c {
                ' ' | '\t' | ':' => key.clear(),
                '=' => state = AttrState::ValueStart,
                _ => key.push(c),
            },
            AttrState::ValueStart => match c {
                '"' => state = AttrState::QuotedValue,
                ' ' | '\t' => {
                    // key= with nothing after it
                    attributes.insert(std::mem::take(&mut key), String::new());
                    state = AttrState::SeekingKey;
                }
                _ => {
                    value.push(c);
                    state = AttrState::UnquotedValue;
                }
            },
            AttrState::QuotedValue => match c {
                '"' => {
                    attributes.insert(std::mem::take(&mut key), std::mem::take(&mut value));
                    state = AttrState::SeekingKey;
                }
                _ => value.push(c),
            },
            AttrState::UnquotedValue => match c {
                ' ' | '\t' => {
                    attributes.insert(std::mem::take(&mut key), std::mem::take(&mut value));
                    state = AttrState::SeekingKey;
                }
                _ => value.push(c),
            },
        }
    }

    match state {
        AttrState::ValueStart => {
            attributes.insert(key, String::new());
        }
        AttrState::UnquotedValue => {
            attributes.insert(key, value);
        }
        // dangling quote, drop the partial value
        AttrState::QuotedValue => debug!("unterminated quote in #EXTINF attributes"),
        AttrState::SeekingKey => {}
    }

    attributes.retain(|k, _| !k.is_empty());
    attributes
}

/// splits an #EXTINF line on the first comma that isn't inside a quoted attribute value
///
/// this is deliberately not a plain first-comma split: `group-title="News, Sports",CNN` keeps
/// its group and gets the title `CNN`, where a plain split would cut the quoted value in half and
/// lose every attribute after it. with unbalanced quotes it falls back to the plain first comma
fn split_title(line: &str) -> (&str, &str) {
    let mut in_quotes = false;

    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return (&line[..i], &line[i + 1..]),
            _ => {}
        }
    }

    // unbalanced quotes, fall back to the plain first comma
    match line.split_once(',') {
        Some((attrs, title)) if in_quotes => (attrs, title),
        _ => (line, ""),
    }
}

pub fn parse_extinf(line: &str) -> ExtInf {
    let (segment, title) = split_title(line);

    ExtInf {
        attributes: parse_attributes(segment),
        title: title.trim().to_string(),
    }
}

/// parse playlist text into channels, in playlist order
///
/// an #EXTINF without a url before the next #EXTINF (or the end of the text) is dropped, other
/// comment lines between an #EXTINF and its url (#EXTVLCOPT, #EXTGRP...) are skipped
pub fn parse_m3u(text: &str) -> Vec<Channel> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut channels = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !lines[i].starts_with(EXTINF) {
            i += 1;
            continue;
        }

        let info = parse_extinf(lines[i]);

        let mut j = i + 1;
        let mut url = None;
        while j < lines.len() {
            let line = lines[j];
            if line.starts_with(EXTINF) {
                break;
            }
            if !line.starts_with('#') {
                url = Some(line);
                break;
            }
            j += 1;
        }

        match url {
            Some(url) => {
                channels.push(info.into_channel(url));
                i = j + 1;
            }
            None => {
                debug!("dropping #EXTINF without a stream url: {}", lines[i]);
                i = j;
            }
        }
    }

    channels
}
