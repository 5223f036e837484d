use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::document::{Document, SearchFlags};
use crate::geometry::RectF;

pub const DEFAULT_BATCH_PAGES: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    Started,
    Progress(f64),
    Finished,
    HighlightMatch { page: usize, rect: RectF },
    MatchesFound { page: usize, matches: Vec<RectF> },
}

/// A scheduled unit of scanning, valid only for the search it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTick {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCursor {
    pub page: usize,
    pub index: usize,
    /// 1-based position among all matches.
    pub ordinal: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchLocation {
    pub page: usize,
    pub rect: RectF,
    pub ordinal: usize,
}

#[derive(Debug, Clone, Copy)]
struct ScanState {
    next_page: usize,
    stop_page: usize,
    scanned: usize,
}

pub struct SearchEngine {
    document: Arc<dyn Document>,
    batch_pages: usize,
    generation: u64,
    query: String,
    flags: SearchFlags,
    matches: BTreeMap<usize, Vec<RectF>>,
    match_count: usize,
    cursor: Option<MatchCursor>,
    scan: Option<ScanState>,
    events: Vec<SearchEvent>,
}

impl SearchEngine {
    pub fn new(document: Arc<dyn Document>, batch_pages: usize) -> Self {
        Self {
            document,
            batch_pages: batch_pages.max(1),
            generation: 0,
            query: String::new(),
            flags: SearchFlags::default(),
            matches: BTreeMap::new(),
            match_count: 0,
            cursor: None,
            scan: None,
            events: Vec::new(),
        }
    }

    /// Starts a new search from `start_page`, cancelling any scan in flight.
    ///
    /// An empty `text` clears the search. Repeating the query and flags of a
    /// finished search that found matches steps to the next match instead of
    /// scanning again.
    pub fn find(&mut self, text: &str, flags: SearchFlags, start_page: Option<usize>) {
        if !text.is_empty()
            && text == self.query
            && flags == self.flags
            && !self.is_scanning()
            && self.match_count > 0
        {
            self.next_match();
            return;
        }

        let page_count = self.document.num_pages();
        let start = match start_page {
            Some(page) if page < page_count => Some(page),
            _ => None,
        };
        if !text.is_empty() && start.is_none() {
            debug!(?start_page, "search requested without a current page");
            return;
        }

        self.reset();
        self.events.push(SearchEvent::Started);
        if text.is_empty() {
            self.events.push(SearchEvent::Finished);
            return;
        }

        let Some(start) = start else {
            return;
        };
        self.query = text.to_string();
        self.flags = flags;
        self.scan = Some(ScanState {
            next_page: start,
            stop_page: (start + page_count - 1) % page_count,
            scanned: 0,
        });
        debug!(query = %self.query, start, "search started");
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.query.clear();
        self.flags = SearchFlags::default();
        self.matches.clear();
        self.match_count = 0;
        self.cursor = None;
        self.scan = None;
    }

    pub fn pending_tick(&self) -> Option<SearchTick> {
        self.scan.map(|_| SearchTick {
            generation: self.generation,
        })
    }

    /// Scans one batch of pages. A tick issued before the latest `find` is
    /// ignored. Returns `true` if any page was scanned.
    pub fn run_tick(&mut self, tick: SearchTick) -> bool {
        if tick.generation != self.generation {
            return false;
        }
        let Some(mut scan) = self.scan else {
            return false;
        };

        let page_count = self.document.num_pages();
        let mut finished = false;
        for _ in 0..self.batch_pages {
            let page = scan.next_page;
            let found = self.search_page(page);
            scan.scanned += 1;

            let mut stop_early = false;
            if !found.is_empty() {
                if self.cursor.is_none() {
                    self.cursor = Some(MatchCursor {
                        page,
                        index: 0,
                        ordinal: 1,
                    });
                    self.events.push(SearchEvent::HighlightMatch {
                        page,
                        rect: found[0],
                    });
                    stop_early = true;
                }
                self.match_count += found.len();
                self.matches.insert(page, found.clone());
                self.events.push(SearchEvent::MatchesFound {
                    page,
                    matches: found,
                });
            }

            if page == scan.stop_page || page_count == 0 {
                finished = true;
                break;
            }
            scan.next_page = (page + 1) % page_count;
            if stop_early {
                break;
            }
        }

        let progress = if page_count == 0 {
            1.0
        } else {
            scan.scanned as f64 / page_count as f64
        };
        self.events.push(SearchEvent::Progress(progress.min(1.0)));

        if finished {
            self.scan = None;
            self.events.push(SearchEvent::Finished);
            info!(
                query = %self.query,
                matches = self.match_count,
                pages = scan.scanned,
                "search finished"
            );
        } else {
            self.scan = Some(scan);
        }
        true
    }

    pub fn run_to_completion(&mut self) {
        while let Some(tick) = self.pending_tick() {
            self.run_tick(tick);
        }
    }

    fn search_page(&self, page: usize) -> Vec<RectF> {
        match self
            .document
            .search_page_text(page, &self.query, self.flags)
        {
            Ok(found) => found,
            Err(err) => {
                warn!(?err, page, "text search failed");
                Vec::new()
            }
        }
    }

    pub fn next_match(&mut self) -> Option<MatchLocation> {
        self.step(true)
    }

    pub fn previous_match(&mut self) -> Option<MatchLocation> {
        self.step(false)
    }

    fn step(&mut self, forward: bool) -> Option<MatchLocation> {
        if self.match_count == 0 {
            return None;
        }
        let page_count = self.document.num_pages();

        let next = match self.cursor {
            None => {
                let (&page, rects) = if forward {
                    self.matches.iter().next()?
                } else {
                    self.matches.iter().next_back()?
                };
                let index = if forward { 0 } else { rects.len() - 1 };
                let ordinal = if forward { 1 } else { self.match_count };
                MatchCursor {
                    page,
                    index,
                    ordinal,
                }
            }
            Some(cursor) => {
                let ordinal = if forward {
                    cursor.ordinal % self.match_count + 1
                } else if cursor.ordinal <= 1 {
                    self.match_count
                } else {
                    cursor.ordinal - 1
                };
                let on_page = self.matches.get(&cursor.page).map_or(0, Vec::len);
                if forward && cursor.index + 1 < on_page {
                    MatchCursor {
                        index: cursor.index + 1,
                        ordinal,
                        ..cursor
                    }
                } else if !forward && cursor.index > 0 && cursor.index <= on_page {
                    MatchCursor {
                        index: cursor.index - 1,
                        ordinal,
                        ..cursor
                    }
                } else {
                    let page = self.neighbour_page_with_matches(cursor.page, forward, page_count)?;
                    let len = self.matches.get(&page).map_or(0, Vec::len);
                    MatchCursor {
                        page,
                        index: if forward { 0 } else { len.saturating_sub(1) },
                        ordinal,
                    }
                }
            }
        };

        self.cursor = Some(next);
        let rect = *self.matches.get(&next.page)?.get(next.index)?;
        self.events.push(SearchEvent::HighlightMatch {
            page: next.page,
            rect,
        });
        Some(MatchLocation {
            page: next.page,
            rect,
            ordinal: next.ordinal,
        })
    }

    /// Nearest page after (or before) `page` with recorded matches, wrapping at
    /// the document bounds and ending back on `page` itself.
    fn neighbour_page_with_matches(
        &self,
        page: usize,
        forward: bool,
        page_count: usize,
    ) -> Option<usize> {
        if page_count == 0 {
            return None;
        }
        (1..=page_count)
            .map(|step| {
                if forward {
                    (page + step) % page_count
                } else {
                    (page + page_count - step % page_count) % page_count
                }
            })
            .find(|candidate| {
                self.matches
                    .get(candidate)
                    .is_some_and(|rects| !rects.is_empty())
            })
    }

    pub fn drain_events(&mut self) -> Vec<SearchEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn flags(&self) -> SearchFlags {
        self.flags
    }

    pub fn is_scanning(&self) -> bool {
        self.scan.is_some()
    }

    pub fn matches(&self) -> &BTreeMap<usize, Vec<RectF>> {
        &self.matches
    }

    pub fn matches_on(&self, page: usize) -> &[RectF] {
        self.matches.get(&page).map_or(&[], Vec::as_slice)
    }

    pub fn matches_count(&self) -> usize {
        self.match_count
    }

    pub fn current_index(&self) -> usize {
        self.cursor.map_or(0, |cursor| cursor.ordinal)
    }

    pub fn current_match(&self) -> Option<MatchCursor> {
        self.cursor
    }
}
