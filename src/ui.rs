use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::detail::{format_display_date, DetailLoader};
use crate::listing::ListingController;
use crate::markup;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const DETAIL_PAGE_SCROLL: u16 = 10;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum View {
    Listing,
    Detail,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum InputMode {
    Normal,
    Search,
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

pub struct Options {
    pub listing: ListingController,
    pub detail: DetailLoader,
    pub status_message: String,
}

pub struct Model {
    listing: ListingController,
    detail: DetailLoader,
    view: View,
    input_mode: InputMode,
    selected: usize,
    category_cursor: usize,
    detail_scroll: u16,
    rendered_body: Option<(i64, Text<'static>)>,
    status_message: String,
    spinner: Spinner,
    needs_redraw: bool,
}

impl Model {
    pub fn new(opts: Options) -> Self {
        let mut model = Self {
            listing: opts.listing,
            detail: opts.detail,
            view: View::Listing,
            input_mode: InputMode::Normal,
            selected: 0,
            category_cursor: 0,
            detail_scroll: 0,
            rendered_body: None,
            status_message: opts.status_message,
            spinner: Spinner::new(),
            needs_redraw: true,
        };
        model.listing.initialize();
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => self.status_message = format!("Error: {err}"),
                        }
                        self.mark_dirty();
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.is_loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn is_loading(&self) -> bool {
        self.listing.is_loading() || self.detail.is_loading()
    }

    fn poll_async(&mut self) -> bool {
        let listing_changed = self.listing.poll();
        let detail_changed = self.detail.poll();
        if listing_changed {
            self.clamp_selection();
            let count = self.listing.categories().len();
            if count > 0 && self.category_cursor >= count {
                self.category_cursor = count - 1;
            }
        }
        listing_changed || detail_changed
    }

    fn clamp_selection(&mut self) {
        let visible = self.listing.visible_posts().len();
        if visible == 0 {
            self.selected = 0;
        } else if self.selected >= visible {
            self.selected = visible - 1;
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        if self.input_mode == InputMode::Search {
            self.handle_search_key(code);
            return Ok(false);
        }
        match self.view {
            View::Listing => self.handle_listing_key(code),
            View::Detail => self.handle_detail_key(code),
        }
    }

    fn handle_search_key(&mut self, code: KeyCode) {
        let mut query = self.listing.state().search_query().to_string();
        match code {
            KeyCode::Esc | KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
                return;
            }
            KeyCode::Backspace => {
                query.pop();
            }
            KeyCode::Char(ch) => query.push(ch),
            _ => return,
        }
        self.listing.set_search_query(query);
        self.selected = 0;
    }

    fn handle_listing_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('/') => {
                self.input_mode = InputMode::Search;
                self.status_message = "Type to filter by title · Enter/Esc to finish".into();
            }
            KeyCode::Esc => {
                if !self.listing.state().search_query().is_empty() {
                    self.listing.set_search_query("");
                    self.selected = 0;
                    self.status_message = "Search cleared.".into();
                }
            }
            KeyCode::Char('j') | KeyCode::Down => {
                let visible = self.listing.visible_posts().len();
                if self.selected + 1 < visible {
                    self.selected += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Char('l') | KeyCode::Char('n') | KeyCode::Right => {
                if self.listing.has_next_page() {
                    self.listing.next_page();
                    self.selected = 0;
                }
            }
            KeyCode::Char('h') | KeyCode::Char('p') | KeyCode::Left => {
                if self.listing.has_prev_page() {
                    self.listing.prev_page();
                    self.selected = 0;
                }
            }
            KeyCode::Tab => {
                let count = self.listing.categories().len();
                if count > 0 {
                    self.category_cursor = (self.category_cursor + 1) % count;
                }
            }
            KeyCode::BackTab => {
                let count = self.listing.categories().len();
                if count > 0 {
                    self.category_cursor = (self.category_cursor + count - 1) % count;
                }
            }
            KeyCode::Char('c') => {
                if let Some(category) = self.listing.categories().get(self.category_cursor).cloned()
                {
                    self.listing.filter_by_category(category.id);
                    self.selected = 0;
                    self.status_message = format!("Loading {}…", category.name);
                }
            }
            KeyCode::Char('r') => {
                self.listing.refresh();
                self.selected = 0;
                self.status_message = "Refreshing posts…".into();
            }
            KeyCode::Enter => {
                if let Some(post) = self.listing.visible_posts().get(self.selected) {
                    let id = post.id;
                    self.open_detail(id);
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_detail_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Esc | KeyCode::Char('b') | KeyCode::Backspace => {
                self.view = View::Listing;
                self.detail.clear();
                self.rendered_body = None;
                self.status_message.clear();
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.detail_scroll = self.detail_scroll.saturating_add(1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.detail_scroll = self.detail_scroll.saturating_sub(1);
            }
            KeyCode::PageDown | KeyCode::Char(' ') => {
                self.detail_scroll = self.detail_scroll.saturating_add(DETAIL_PAGE_SCROLL);
            }
            KeyCode::PageUp => {
                self.detail_scroll = self.detail_scroll.saturating_sub(DETAIL_PAGE_SCROLL);
            }
            KeyCode::Char('o') => {
                let link = self
                    .detail
                    .is_loaded()
                    .then(|| self.detail.post().link.clone())
                    .flatten();
                match link {
                    Some(url) => {
                        webbrowser::open(&url)?;
                        self.status_message = format!("Opened {url}");
                    }
                    None => self.status_message = "This post has no link yet.".into(),
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn open_detail(&mut self, id: i64) {
        self.view = View::Detail;
        self.detail_scroll = 0;
        self.rendered_body = None;
        self.detail.load(id);
        self.status_message.clear();
    }

    fn status_text(&self) -> (String, Color) {
        let error = match self.view {
            View::Listing => self.listing.last_error(),
            View::Detail => self.detail.last_error(),
        };
        if let Some(err) = error {
            let hint = match self.view {
                View::Listing => "press r to retry",
                View::Detail => "Esc to go back",
            };
            return (format!("{err} · {hint}"), COLOR_ERROR);
        }

        let message = if !self.status_message.is_empty() && self.is_loading() {
            self.status_message.clone()
        } else if self.is_loading() {
            "Loading…".to_string()
        } else if !self.status_message.is_empty() && self.input_mode == InputMode::Search {
            self.status_message.clone()
        } else {
            match self.view {
                View::Listing => {
                    let state = self.listing.state();
                    let scope = self
                        .listing
                        .selected_category()
                        .and_then(|id| self.listing.categories().iter().find(|c| c.id == id))
                        .map(|c| c.name.clone())
                        .unwrap_or_else(|| "All posts".to_string());
                    format!(
                        "{scope} · {} of {} posts · page {} of {}",
                        state.filtered_posts().len(),
                        state.all_posts().len(),
                        state.current_page(),
                        state.page_count()
                    )
                }
                View::Detail => {
                    if self.status_message.is_empty() {
                        format!("Post {}", self.detail.current_id().unwrap_or_default())
                    } else {
                        self.status_message.clone()
                    }
                }
            }
        };

        if self.is_loading() {
            (format!("{} {}", self.spinner.frame(), message), COLOR_TEXT_PRIMARY)
        } else {
            (message, COLOR_TEXT_PRIMARY)
        }
    }

    fn footer_text(&self) -> &'static str {
        match (self.view, self.input_mode) {
            (_, InputMode::Search) => "Typing filters titles · Backspace delete · Enter/Esc done",
            (View::Listing, _) => {
                "/ search · j/k move · h/l page · Tab category · c apply category · r refresh · Enter read · q quit"
            }
            (View::Detail, _) => "j/k scroll · Space/PgUp page · o open in browser · Esc back · q quit",
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let (status, color) = self.status_text();
        let status_line = Paragraph::new(status).style(
            Style::default()
                .fg(color)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        match self.view {
            View::Listing => self.draw_listing(frame, layout[1]),
            View::Detail => self.draw_detail(frame, layout[1]),
        }

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[2]);
    }

    fn panel_block(title: &str, focused: bool) -> Block<'_> {
        Block::default()
            .title(Span::styled(
                format!(" {title} "),
                Style::default()
                    .fg(if focused {
                        COLOR_ACCENT
                    } else {
                        COLOR_TEXT_SECONDARY
                    })
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if focused {
                COLOR_BORDER_FOCUSED
            } else {
                COLOR_BORDER_IDLE
            }))
            .style(Style::default().bg(COLOR_PANEL_BG))
    }

    fn draw_listing(&self, frame: &mut Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        self.draw_search(frame, chunks[0]);
        self.draw_categories(frame, chunks[1]);
        self.draw_posts(frame, chunks[2]);
        self.draw_pager(frame, chunks[3]);
    }

    fn draw_search(&self, frame: &mut Frame<'_>, area: Rect) {
        let editing = self.input_mode == InputMode::Search;
        let query = self.listing.state().search_query();
        let line = if query.is_empty() && !editing {
            Line::from(Span::styled(
                "Search by title... (press /)",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))
        } else {
            let mut spans = vec![Span::styled(
                query.to_string(),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )];
            if editing {
                spans.push(Span::styled("▏", Style::default().fg(COLOR_ACCENT)));
            }
            Line::from(spans)
        };
        let paragraph = Paragraph::new(line).block(Self::panel_block("Search", editing));
        frame.render_widget(paragraph, area);
    }

    fn draw_categories(&self, frame: &mut Frame<'_>, area: Rect) {
        let categories = self.listing.categories();
        let line = if categories.is_empty() {
            Line::from(Span::styled(
                "No categories loaded.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))
        } else {
            let mut spans = Vec::with_capacity(categories.len() * 2);
            for (idx, category) in categories.iter().enumerate() {
                if idx > 0 {
                    spans.push(Span::raw(" "));
                }
                let active = self.listing.selected_category() == Some(category.id);
                let mut style = Style::default().fg(if active {
                    COLOR_SUCCESS
                } else {
                    COLOR_TEXT_SECONDARY
                });
                if idx == self.category_cursor {
                    style = style
                        .bg(COLOR_PANEL_SELECTED_BG)
                        .fg(COLOR_TEXT_PRIMARY)
                        .add_modifier(Modifier::BOLD);
                }
                let marker = if active { "●" } else { "○" };
                spans.push(Span::styled(format!(" {marker} {} ", category.name), style));
            }
            Line::from(spans)
        };
        let paragraph = Paragraph::new(line)
            .block(Self::panel_block("Categories", false))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn draw_posts(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Self::panel_block("Posts", self.input_mode == InputMode::Normal)
            .padding(Padding::horizontal(1));
        let width = block.inner(area).width.saturating_sub(2) as usize;
        let posts = self.listing.visible_posts();

        if posts.is_empty() {
            let message = if self.listing.is_loading() {
                "Loading posts…"
            } else if !self.listing.state().search_query().is_empty() {
                "No posts match your search."
            } else {
                "No posts to show."
            };
            let paragraph = Paragraph::new(Span::styled(
                message,
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))
            .block(block);
            frame.render_widget(paragraph, area);
            return;
        }

        let items: Vec<ListItem> = posts
            .iter()
            .map(|post| {
                let title = truncate_to_width(&post.plain_title(), width);
                ListItem::new(Text::from(vec![
                    Line::from(Span::styled(
                        title,
                        Style::default()
                            .fg(COLOR_TEXT_PRIMARY)
                            .add_modifier(Modifier::BOLD),
                    )),
                    Line::from(Span::styled(
                        format!("By {}", post.author),
                        Style::default().fg(COLOR_TEXT_SECONDARY),
                    )),
                    Line::from(Span::styled(
                        format_display_date(&post.published_at),
                        Style::default().fg(COLOR_TEXT_SECONDARY),
                    )),
                    Line::default(),
                ]))
            })
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().bg(COLOR_PANEL_SELECTED_BG))
            .highlight_symbol("▌");
        let mut state = ListState::default();
        state.select(Some(self.selected.min(posts.len() - 1)));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_pager(&self, frame: &mut Frame<'_>, area: Rect) {
        let enabled = Style::default().fg(COLOR_ACCENT).add_modifier(Modifier::BOLD);
        let disabled = Style::default().fg(COLOR_BORDER_IDLE);
        let state = self.listing.state();
        let line = Line::from(vec![
            Span::styled(
                "◀ Previous",
                if self.listing.has_prev_page() {
                    enabled
                } else {
                    disabled
                },
            ),
            Span::styled(
                format!("   {}   ", state.current_page()),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            ),
            Span::styled(
                "Next ▶",
                if self.listing.has_next_page() {
                    enabled
                } else {
                    disabled
                },
            ),
        ]);
        frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
    }

    fn draw_detail(&mut self, frame: &mut Frame<'_>, area: Rect) {
        let post = self.detail.post().clone();
        let loaded = self.detail.is_loaded();

        if loaded
            && self
                .rendered_body
                .as_ref()
                .map_or(true, |(id, _)| *id != post.id)
        {
            self.rendered_body = Some((post.id, markup::render_body(&post.content)));
        }

        let mut lines: Vec<Line<'static>> = Vec::new();
        if let Some(url) = self.detail.hero_image_url() {
            lines.push(Line::from(vec![
                Span::styled("▣ Featured image ", Style::default().fg(COLOR_SUCCESS)),
                Span::styled(url.to_string(), Style::default().fg(COLOR_TEXT_SECONDARY)),
            ]));
            lines.push(Line::default());
        }
        lines.push(Line::from(Span::styled(
            post.plain_title(),
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(Span::styled(
            format!(
                "By {} | {}",
                post.author,
                format_display_date(&post.published_at)
            ),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));
        lines.push(Line::default());
        match (&self.rendered_body, loaded) {
            (Some((_, body)), true) => lines.extend(body.lines.iter().cloned()),
            _ => lines.push(Line::from(markup::plain_text(&post.content))),
        }

        let paragraph = Paragraph::new(Text::from(lines))
            .block(Self::panel_block("Post", true).padding(Padding::horizontal(1)))
            .wrap(Wrap { trim: false })
            .scroll((self.detail_scroll, 0));
        frame.render_widget(paragraph, area);
    }
}

fn truncate_to_width(text: &str, width: usize) -> String {
    if width == 0 || text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}
