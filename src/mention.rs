use crate::protocol::TabInfo;
use hashlink::LinkedHashSet;
use once_cell::sync::Lazy;
use regex::Regex;

/// Inline reference token: `@tab:<id>:<label>:`.
static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@tab:(\d+):([^@]*?):").expect("mention regex")
});

/// A resolved inline reference to a live tab.
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    pub id: u32,
    pub title: String,
    pub url: String,
    pub fav_icon_url: Option<String>,
}

/// Extract every well-formed mention token from `text`, left to right and
/// non-overlapping, resolving each against the live tab list. Tokens whose id
/// is not currently listed are dropped silently; an empty embedded label
/// falls back to the live tab's title.
pub fn scan(text: &str, live: &[TabInfo]) -> Vec<Mention> {
    let mut mentions = Vec::new();
    for caps in MENTION_RE.captures_iter(text) {
        let Ok(id) = caps[1].parse::<u32>() else {
            continue;
        };
        let Some(tab) = live.iter().find(|t| t.id == id) else {
            continue;
        };
        let label = &caps[2];
        mentions.push(Mention {
            id,
            title: if label.is_empty() {
                tab.title.clone()
            } else {
                label.to_string()
            },
            url: tab.url.clone(),
            fav_icon_url: tab.fav_icon_url.clone(),
        });
    }
    mentions
}

/// An open reference-entry state: an `@` has been typed and no `:` has
/// completed it yet. `start` is the byte offset of the `@`; `query` is the
/// text typed after it, up to the cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryContext {
    pub start: usize,
    pub query: String,
}

/// Detect an open reference-entry state at `cursor`: the nearest preceding
/// `@` with no `:` between it and the cursor. Completed tokens have a `:`
/// right after the id, so they never re-open.
pub fn entry_context(text: &str, cursor: usize) -> Option<EntryContext> {
    let before = &text[..clamp_to_boundary(text, cursor)];
    let start = before.rfind('@')?;
    let after_at = &before[start + 1..];
    if after_at.contains(':') {
        return None;
    }
    Some(EntryContext {
        start,
        query: after_at.to_string(),
    })
}

/// Completion candidates for an entry query: case-insensitive substring match
/// on title or url, in listing order.
pub fn filter_tabs<'a>(tabs: &'a [TabInfo], query: &str) -> Vec<&'a TabInfo> {
    let needle = query.to_lowercase();
    tabs.iter()
        .filter(|t| {
            t.title.to_lowercase().contains(&needle) || t.url.to_lowercase().contains(&needle)
        })
        .collect()
}

/// Replace the span from the triggering `@` to `cursor` with a fully-formed
/// token for `tab`. Returns the new text and the cursor position immediately
/// after the inserted token; the caller drops its [`EntryContext`] to close
/// the reference-entry state.
///
/// `@` and `:` are the token delimiters, so they are stripped from the
/// embedded label; [`scan`] restores the live title for a label that ends up
/// empty.
pub fn insert(text: &str, cursor: usize, ctx: &EntryContext, tab: &TabInfo) -> (String, usize) {
    let cursor = clamp_to_boundary(text, cursor);
    let before = &text[..ctx.start];
    let after = &text[cursor..];
    let label: String = tab
        .title
        .chars()
        .filter(|c| !matches!(c, '@' | ':'))
        .collect();
    let token = format!("@tab:{}:{}:", tab.id, label);
    let new_cursor = before.len() + token.len();
    (format!("{before}{token}{after}"), new_cursor)
}

/// Snap a byte offset down to the nearest char boundary.
fn clamp_to_boundary(text: &str, cursor: usize) -> usize {
    let mut c = cursor.min(text.len());
    while !text.is_char_boundary(c) {
        c -= 1;
    }
    c
}

/// Ordered-insertion, deduplicated set of tab ids attached to the pending
/// submission: the union of explicit selection and inline mentions.
#[derive(Debug, Default, Clone)]
pub struct SelectionSet {
    ids: LinkedHashSet<u32>,
}

impl SelectionSet {
    pub fn insert(&mut self, id: u32) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: u32) {
        self.ids.remove(&id);
    }

    pub fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Union in the ids extracted from inline mentions.
    pub fn merge_mentions(&mut self, mentions: &[Mention]) {
        for m in mentions {
            self.ids.insert(m.id);
        }
    }

    /// Drop ids that no longer appear in the live tab list (closed tabs).
    pub fn retain_live(&mut self, live: &[TabInfo]) {
        let kept: LinkedHashSet<u32> = self
            .ids
            .iter()
            .copied()
            .filter(|id| live.iter().any(|t| t.id == *id))
            .collect();
        self.ids = kept;
    }

    /// When the selection has emptied out, fall back to the current tab.
    pub fn fallback_to(&mut self, current_tab: Option<u32>) {
        if self.ids.is_empty() {
            if let Some(id) = current_tab {
                self.ids.insert(id);
            }
        }
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<u32> {
        self.ids.iter().copied().collect()
    }
}
