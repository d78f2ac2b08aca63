//! Terminal rendering for the pre-rendered HTML the blog API hands out.
//!
//! The API's HTML is trusted as content but never reaches the terminal as
//! markup: bodies go through HTML → Markdown → styled lines, titles through
//! tag stripping and entity decoding. Control characters are dropped so a
//! post cannot emit escape sequences.

use once_cell::sync::Lazy;
use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::layout::Alignment;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static BREAK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</p>|</div>|</li>|</h[1-6]>").expect("valid break regex")
});

/// Strips tags, decodes entities and collapses whitespace into one line.
pub fn plain_text(html: &str) -> String {
    let with_breaks = BREAK_RE.replace_all(html, " ");
    let stripped = TAG_RE.replace_all(&with_breaks, "");
    let decoded = html_escape::decode_html_entities(&stripped);
    strip_control(&decoded)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Like [`plain_text`] but keeps paragraph breaks; used for non-interactive output.
pub fn plain_paragraphs(html: &str) -> String {
    let with_breaks = BREAK_RE.replace_all(html, "\n");
    let stripped = TAG_RE.replace_all(&with_breaks, "");
    let decoded = html_escape::decode_html_entities(&stripped);
    strip_control(&decoded)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_body(html: &str) -> Text<'static> {
    let markdown = html2md::parse_html(html);
    BodyRenderer::default().render(&markdown)
}

fn strip_control(input: &str) -> String {
    input
        .chars()
        .filter(|ch| !ch.is_control() || *ch == '\n' || *ch == '\t')
        .collect()
}

#[derive(Clone)]
enum Block {
    Paragraph(String),
    Heading { level: u8, text: String },
    Item { depth: usize, marker: String, text: String },
    Quote(String),
    Code(String),
    Gap,
}

#[derive(Clone, Copy)]
struct ListLevel {
    next: Option<u64>,
}

#[derive(Default)]
struct BodyRenderer {
    blocks: Vec<Block>,
    buffer: String,
    lists: Vec<ListLevel>,
    item_marker: Option<String>,
    quote_depth: usize,
    heading: Option<u8>,
    code: Option<String>,
    link: Option<(String, usize)>,
}

impl BodyRenderer {
    fn render(mut self, markdown: &str) -> Text<'static> {
        let mut opts = Options::empty();
        opts.insert(Options::ENABLE_STRIKETHROUGH);
        opts.insert(Options::ENABLE_TABLES);

        for event in Parser::new_ext(markdown, opts) {
            match event {
                Event::Start(tag) => self.open(tag),
                Event::End(tag) => self.close(tag),
                Event::Text(text) => self.text(text),
                Event::Code(code) => self.push(format!("`{code}`")),
                Event::SoftBreak => self.push(" "),
                Event::HardBreak => self.push("\n"),
                Event::Rule => {
                    self.flush();
                    self.blocks.push(Block::Paragraph("―".repeat(20)));
                    self.blocks.push(Block::Gap);
                }
                _ => {}
            }
        }
        self.flush();
        self.finish()
    }

    fn open(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.flush(),
            Tag::Heading { level, .. } => {
                self.flush();
                self.heading = Some(heading_level(level));
            }
            Tag::BlockQuote => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                if let CodeBlockKind::Fenced(lang) = kind {
                    if !lang.is_empty() {
                        self.blocks.push(Block::Code(format!("[{lang}]")));
                    }
                }
                self.code = Some(String::new());
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(ListLevel { next: start });
            }
            Tag::Item => {
                self.flush();
                if let Some(level) = self.lists.last_mut() {
                    let marker = match level.next.as_mut() {
                        Some(n) => {
                            let marker = format!("{n}.");
                            *n += 1;
                            marker
                        }
                        None => "•".to_string(),
                    };
                    self.item_marker = Some(marker);
                }
            }
            Tag::Link { dest_url, .. } => {
                self.link = Some((dest_url.into_string(), self.buffer.len()));
            }
            Tag::Image { .. } => self.push("[image: "),
            Tag::TableCell => self.push("| "),
            _ => {}
        }
    }

    fn close(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                self.flush();
                self.blocks.push(Block::Gap);
            }
            TagEnd::Heading(_) => {
                self.flush();
                self.heading = None;
                self.blocks.push(Block::Gap);
            }
            TagEnd::BlockQuote => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.blocks.push(Block::Gap);
            }
            TagEnd::CodeBlock => {
                if let Some(code) = self.code.take() {
                    for line in code.trim_end_matches('\n').split('\n') {
                        self.blocks.push(Block::Code(line.to_string()));
                    }
                    self.blocks.push(Block::Gap);
                }
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blocks.push(Block::Gap);
                }
            }
            TagEnd::Item => {
                self.flush();
                self.item_marker = None;
            }
            TagEnd::Link => {
                if let Some((target, start)) = self.link.take() {
                    let label = self.buffer.get(start..).unwrap_or_default().trim();
                    if !target.is_empty() && label != target {
                        self.push(format!(" ({target})"));
                    }
                }
            }
            TagEnd::Image => self.push("]"),
            TagEnd::TableRow | TagEnd::TableHead => self.push("\n"),
            _ => {}
        }
    }

    fn text(&mut self, text: CowStr<'_>) {
        match self.code.as_mut() {
            Some(code) => code.push_str(&text),
            None => self.push(text),
        }
    }

    fn push<T: AsRef<str>>(&mut self, text: T) {
        self.buffer.push_str(text.as_ref());
    }

    fn flush(&mut self) {
        let text = strip_control(self.buffer.trim());
        self.buffer.clear();
        if text.is_empty() {
            return;
        }

        let block = if let Some(level) = self.heading {
            Block::Heading { level, text }
        } else if let Some(marker) = self.item_marker.clone() {
            Block::Item {
                depth: self.lists.len().saturating_sub(1),
                marker,
                text,
            }
        } else if self.quote_depth > 0 {
            Block::Quote(text)
        } else {
            Block::Paragraph(text)
        };
        self.blocks.push(block);
    }

    fn finish(mut self) -> Text<'static> {
        while matches!(self.blocks.last(), Some(Block::Gap)) {
            self.blocks.pop();
        }

        let mut lines: Vec<Line<'static>> = Vec::with_capacity(self.blocks.len());
        let mut previous_gap = true;
        for block in self.blocks {
            let is_gap = matches!(block, Block::Gap);
            if is_gap && previous_gap {
                continue;
            }
            previous_gap = is_gap;
            match block {
                Block::Paragraph(text) => {
                    lines.extend(text.split('\n').map(|l| Line::from(l.trim().to_string())));
                }
                Block::Heading { level, text } => {
                    lines.push(Line::from(Span::styled(text, heading_style(level))));
                }
                Block::Item {
                    depth,
                    marker,
                    text,
                } => lines.push(Line::from(vec![
                    Span::raw("  ".repeat(depth)),
                    Span::styled(format!("{marker} "), Style::default().fg(Color::Yellow)),
                    Span::raw(text),
                ])),
                Block::Quote(text) => lines.push(Line::from(Span::styled(
                    format!("│ {text}"),
                    Style::default().fg(Color::Green),
                ))),
                Block::Code(text) => lines.push(Line::from(Span::styled(
                    text,
                    Style::default().fg(Color::Cyan),
                ))),
                Block::Gap => lines.push(Line::default()),
            }
        }

        if lines.is_empty() {
            lines.push(Line::default());
        }

        Text {
            lines,
            alignment: Some(Alignment::Left),
            style: Style::default(),
        }
    }
}

fn heading_style(level: u8) -> Style {
    match level {
        1 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        2 => Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
        _ => Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_strings(text: &Text<'_>) -> Vec<String> {
        text.lines
            .iter()
            .map(|line| {
                line.spans
                    .iter()
                    .map(|span| span.content.as_ref())
                    .collect::<String>()
            })
            .collect()
    }

    #[test]
    fn plain_text_strips_tags_and_decodes_entities() {
        assert_eq!(
            plain_text("<em>Fish</em> &amp; <strong>Chips</strong>&#8217;s"),
            "Fish & Chips’s"
        );
        assert_eq!(plain_text("  spaced\n\tout  "), "spaced out");
    }

    #[test]
    fn plain_text_drops_escape_sequences() {
        assert_eq!(plain_text("safe\u{1b}[2Jtext"), "safe[2Jtext");
    }

    #[test]
    fn plain_paragraphs_keeps_breaks() {
        assert_eq!(
            plain_paragraphs("<p>One</p>\n<p>Two<br/>Three</p>"),
            "One\n\nTwo\n\nThree"
        );
    }

    #[test]
    fn renders_headings_paragraphs_and_lists() {
        let text = render_body("<h2>Intro</h2><p>Hello <b>there</b>.</p><ul><li>a</li><li>b</li></ul>");
        let lines = line_strings(&text);

        assert!(lines.iter().any(|l| l == "Intro"), "{lines:?}");
        assert!(lines.iter().any(|l| l.contains("Hello") && l.contains("there")), "{lines:?}");
        assert!(lines.iter().any(|l| l.ends_with("• a")), "{lines:?}");
        assert!(lines.iter().any(|l| l.ends_with("• b")), "{lines:?}");
        assert!(!lines.iter().any(|l| l.contains('<')), "{lines:?}");
    }

    #[test]
    fn link_targets_are_shown_after_label() {
        let text = render_body(r#"<p>See <a href="https://example.com/x">the docs</a></p>"#);
        let lines = line_strings(&text);
        assert!(
            lines.iter().any(|l| l.contains("the docs (https://example.com/x)")),
            "{lines:?}"
        );
    }

    #[test]
    fn empty_body_renders_single_blank_line() {
        let text = render_body("");
        assert_eq!(text.lines.len(), 1);
    }
}
