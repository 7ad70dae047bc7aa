//! Pagination utilities.
//!
//! Text is laid out greedily: words fill a line until the next word would
//! overflow the viewport width, lines fill a page until the next line would
//! overflow the viewport height. Widths come from a fixed glyph metrics table
//! so identical inputs always produce identical page tables, which is what
//! keeps the layout cache valid across launches.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::iter::Peekable;

/// Per-character advance widths (pixels) for the reading font.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphMetrics {
    pub line_height: u32,
    pub space_advance: u32,
    pub default_advance: u32,
    #[serde(default)]
    pub advances: BTreeMap<char, u32>,
}

impl GlyphMetrics {
    /// Approximation of an 18px proportional font on a 1-bit panel.
    pub fn builtin() -> Self {
        let mut advances = BTreeMap::new();
        for ch in "il.,:;'!|`".chars() {
            advances.insert(ch, 4);
        }
        for ch in "fjrt()[]-\"".chars() {
            advances.insert(ch, 6);
        }
        for ch in "mw".chars() {
            advances.insert(ch, 14);
        }
        for ch in 'A'..='Z' {
            advances.insert(ch, 12);
        }
        for ch in "IJ".chars() {
            advances.insert(ch, 6);
        }
        for ch in "MW".chars() {
            advances.insert(ch, 16);
        }
        GlyphMetrics {
            line_height: 22,
            space_advance: 5,
            default_advance: 9,
            advances,
        }
    }

    pub fn advance(&self, ch: char) -> u32 {
        if ch.is_whitespace() {
            return self.space_advance;
        }
        self.advances
            .get(&ch)
            .copied()
            .unwrap_or(self.default_advance)
    }

    pub fn measure(&self, word: &str) -> u32 {
        word.chars().map(|ch| self.advance(ch)).sum()
    }

    /// Smallest advance of any glyph, the space included.
    pub fn narrowest_advance(&self) -> u32 {
        self.advances
            .values()
            .copied()
            .chain([self.space_advance, self.default_advance])
            .min()
            .unwrap_or(1)
            .max(1)
    }
}

impl Default for GlyphMetrics {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Text area available for page content, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Text area of a panel once margins and the footer line are removed.
    pub fn for_display(width: u32, height: u32, margin: u32, metrics: &GlyphMetrics) -> Self {
        let footer = metrics.line_height + metrics.line_height / 2;
        Viewport {
            width: width.saturating_sub(2 * margin).max(1),
            height: height.saturating_sub(2 * margin + footer).max(1),
        }
    }

    pub fn lines_per_page(&self, metrics: &GlyphMetrics) -> usize {
        (self.height / metrics.line_height.max(1)).max(1) as usize
    }
}

/// Everything that influences where page breaks fall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderParams {
    pub metrics: GlyphMetrics,
    pub viewport: Viewport,
}

impl RenderParams {
    pub fn new(metrics: GlyphMetrics, viewport: Viewport) -> Self {
        Self { metrics, viewport }
    }

    /// Stable fingerprint of the layout parameters, used as a cache key.
    pub fn params_hash(&self) -> String {
        // BTreeMap keeps the serialized form canonical.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        format!("{:x}", hasher.finalize())
    }

    /// Most characters a wrapped line can hold.
    pub fn max_line_chars(&self) -> usize {
        (self.viewport.width / self.metrics.narrowest_advance()).max(1) as usize
    }
}

/// One page: a half-open byte range of a single chapter's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    pub chapter: usize,
    pub start: usize,
    pub end: usize,
}

impl PageSpan {
    pub fn contains(&self, chapter: usize, offset: usize) -> bool {
        self.chapter == chapter && self.start <= offset && offset < self.end
    }
}

/// Ordered pages covering a book, chapter by chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTable {
    pages: Vec<PageSpan>,
}

impl PageTable {
    pub fn new(pages: Vec<PageSpan>) -> Self {
        Self { pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PageSpan> {
        self.pages.get(index)
    }

    pub fn pages(&self) -> &[PageSpan] {
        &self.pages
    }

    pub fn extend(&mut self, pages: impl IntoIterator<Item = PageSpan>) {
        self.pages.extend(pages);
    }

    /// Index of the page holding `offset` in `chapter`.
    pub fn find(&self, chapter: usize, offset: usize) -> Option<usize> {
        let idx = self
            .pages
            .partition_point(|page| (page.chapter, page.start) <= (chapter, offset));
        let candidate = idx.checked_sub(1)?;
        let page = self.pages[candidate];
        page.contains(chapter, offset).then_some(candidate)
    }

    /// First page at or after the start of `chapter`.
    pub fn first_page_of_chapter(&self, chapter: usize) -> Option<usize> {
        let idx = self.pages.partition_point(|page| page.chapter < chapter);
        (idx < self.pages.len()).then_some(idx)
    }

    pub fn is_prefix_of(&self, other: &PageTable) -> bool {
        other.pages.starts_with(&self.pages)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line {
    Text { start: usize, end: usize },
    Blank { at: usize },
}

impl Line {
    fn start(&self) -> usize {
        match *self {
            Line::Text { start, .. } => start,
            Line::Blank { at } => at,
        }
    }
}

fn char_boundary_at_or_after(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset += 1;
    }
    offset
}

/// Greedy line breaker over one chapter's text.
struct LineBreaker<'a> {
    text: &'a str,
    metrics: &'a GlyphMetrics,
    width: u32,
    pos: usize,
    in_paragraph: bool,
    last_blank: bool,
    emitted_any: bool,
}

impl<'a> LineBreaker<'a> {
    fn new(text: &'a str, metrics: &'a GlyphMetrics, width: u32, start: usize) -> Self {
        Self {
            text,
            metrics,
            width,
            pos: char_boundary_at_or_after(text, start),
            in_paragraph: false,
            last_blank: false,
            emitted_any: false,
        }
    }

    fn paragraph_end(&self, from: usize) -> usize {
        self.text[from..]
            .find('\n')
            .map(|idx| from + idx)
            .unwrap_or(self.text.len())
    }

    fn next_word(&self, from: usize, limit: usize) -> Option<(usize, usize)> {
        let slice = &self.text[from..limit];
        let rel_start = slice.find(|ch: char| !ch.is_whitespace())?;
        let start = from + rel_start;
        let end = self.text[start..limit]
            .find(char::is_whitespace)
            .map(|idx| start + idx)
            .unwrap_or(limit);
        Some((start, end))
    }

    fn fill_line(&self, first: (usize, usize), para_end: usize) -> usize {
        let (_, first_end) = first;
        let mut width = self.metrics.measure(&self.text[first.0..first_end]);
        let mut end = first_end;
        while let Some((start, word_end)) = self.next_word(end, para_end) {
            let needed =
                width + self.metrics.space_advance + self.metrics.measure(&self.text[start..word_end]);
            if needed > self.width {
                break;
            }
            width = needed;
            end = word_end;
        }
        end
    }
}

impl Iterator for LineBreaker<'_> {
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        loop {
            if self.pos >= self.text.len() {
                return None;
            }
            let para_end = self.paragraph_end(self.pos);
            match self.next_word(self.pos, para_end) {
                Some(word) => {
                    let end = self.fill_line(word, para_end);
                    self.pos = end;
                    self.in_paragraph = true;
                    self.last_blank = false;
                    self.emitted_any = true;
                    return Some(Line::Text {
                        start: word.0,
                        end,
                    });
                }
                None => {
                    let at = self.pos;
                    let blank_paragraph = !self.in_paragraph;
                    self.pos = (para_end + 1).min(self.text.len());
                    self.in_paragraph = false;
                    if blank_paragraph && self.emitted_any && !self.last_blank {
                        self.last_blank = true;
                        return Some(Line::Blank { at });
                    }
                }
            }
        }
    }
}

/// Lazily yields the start offset of each page's first line.
struct PageStarts<'a> {
    lines: Peekable<LineBreaker<'a>>,
    lines_per_page: usize,
}

impl Iterator for PageStarts<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let mut first_start = None;
        let mut count = 0;
        while count < self.lines_per_page {
            match self.lines.peek() {
                None => break,
                Some(Line::Blank { .. }) if count == 0 => {
                    self.lines.next();
                }
                Some(line) => {
                    first_start.get_or_insert(line.start());
                    self.lines.next();
                    count += 1;
                }
            }
        }
        first_start
    }
}

/// Lazy page iterator for one chapter.
///
/// Taking the first `k` items yields exactly the first `k` pages of the
/// complete pagination, so partial tables are prefixes of full ones.
pub struct ChapterPages<'a> {
    chapter: usize,
    text_len: usize,
    starts: PageStarts<'a>,
    current: Option<usize>,
}

impl Iterator for ChapterPages<'_> {
    type Item = PageSpan;

    fn next(&mut self) -> Option<PageSpan> {
        let start = self.current.take()?;
        let next = self.starts.next();
        self.current = next;
        Some(PageSpan {
            chapter: self.chapter,
            start,
            end: next.unwrap_or(self.text_len),
        })
    }
}

pub fn chapter_pages<'a>(
    chapter: usize,
    text: &'a str,
    params: &'a RenderParams,
    start_offset: usize,
) -> ChapterPages<'a> {
    let start_offset = char_boundary_at_or_after(text, start_offset);
    let mut starts = PageStarts {
        lines: LineBreaker::new(text, &params.metrics, params.viewport.width, start_offset)
            .peekable(),
        lines_per_page: params.viewport.lines_per_page(&params.metrics),
    };
    // The first page absorbs any leading whitespace.
    let current = starts.next().map(|_| start_offset);
    ChapterPages {
        chapter,
        text_len: text.len(),
        starts,
        current,
    }
}

/// Page start offsets for `text`, beginning at `start_offset`.
///
/// A whitespace-only text yields no pages.
pub fn paginate(
    text: &str,
    metrics: &GlyphMetrics,
    viewport: Viewport,
    start_offset: usize,
) -> Vec<usize> {
    let params = RenderParams::new(metrics.clone(), viewport);
    chapter_pages(0, text, &params, start_offset)
        .map(|page| page.start)
        .collect()
}

/// Paginate whole chapters in order into a single table.
pub fn paginate_chapters<'a>(
    chapters: impl IntoIterator<Item = &'a str>,
    params: &RenderParams,
) -> PageTable {
    let mut table = PageTable::default();
    for (index, text) in chapters.into_iter().enumerate() {
        table.extend(chapter_pages(index, text, params, 0));
    }
    table
}

/// Display lines of one page, re-wrapped with the same line breaker.
pub fn lines_for(text: &str, span: &PageSpan, params: &RenderParams) -> Vec<String> {
    let end = span.end.min(text.len());
    let lines_per_page = params.viewport.lines_per_page(&params.metrics);
    let mut out = Vec::new();
    for line in LineBreaker::new(text, &params.metrics, params.viewport.width, span.start) {
        if line.start() >= end || out.len() >= lines_per_page {
            break;
        }
        match line {
            Line::Text { start, end } => out.push(
                text[start..end]
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Line::Blank { .. } if !out.is_empty() => out.push(String::new()),
            Line::Blank { .. } => {}
        }
    }
    while out.last().is_some_and(|line| line.is_empty()) {
        out.pop();
    }
    out
}
