use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{self, Config};
use crate::data::{ContentService, WordpressContentService};
use crate::detail::{format_display_date, DetailLoader};
use crate::listing::{ListingController, ListingState};
use crate::logging;
use crate::markup;
use crate::media::{self, HttpImageProbe, ImageProbe};
use crate::ui;
use crate::wordpress::{self, Post};

const WRAP_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Interactive,
    List,
    Post(i64),
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    pub mode: Mode,
}

pub fn run(opts: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: opts.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;

    match logging::init(&cfg.log) {
        Ok(Some(path)) => {
            tracing::info!(version = crate::VERSION, log = %path.display(), "starting");
        }
        Ok(None) => {}
        Err(err) => eprintln!("warning: logging disabled: {err:#}"),
    }

    let service = build_service(&cfg)?;
    let probe = build_probe(&cfg)?;

    match opts.mode {
        Mode::Interactive => {
            let config_path = opts.config_file.or_else(config::default_path);
            let status = format!(
                "Loading posts… (config: {})",
                friendly_path(config_path.as_ref())
            );
            let mut model = ui::Model::new(ui::Options {
                listing: ListingController::new(service.clone()),
                detail: DetailLoader::new(service, probe),
                status_message: status,
            });
            model.run()?;
            tracing::info!("exiting");
            Ok(())
        }
        Mode::List => {
            let timeout = cfg.http.timeout * 2;
            print_listing(ListingController::new(service), timeout)
        }
        Mode::Post(id) => {
            let timeout = cfg.http.timeout + cfg.media.probe_timeout;
            print_post(DetailLoader::new(service, probe), id, timeout)
        }
    }
}

fn build_service(cfg: &Config) -> Result<Arc<dyn ContentService>> {
    let client = wordpress::Client::new(wordpress::ClientConfig {
        user_agent: cfg.http.user_agent.clone(),
        timeout: cfg.http.timeout,
        base_url: None,
        http_client: None,
    })
    .context("create content client")?;
    Ok(Arc::new(WordpressContentService::new(Arc::new(client))))
}

fn build_probe(cfg: &Config) -> Result<Arc<dyn ImageProbe>> {
    let probe = HttpImageProbe::new(media::Config {
        timeout: cfg.media.probe_timeout,
        allowed_hosts: cfg.media.allowed_hosts.clone(),
        user_agent: cfg.http.user_agent.clone(),
        ..media::Config::default()
    })
    .context("create image probe")?;
    Ok(Arc::new(probe))
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::default_spinner());
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_listing(mut listing: ListingController, timeout: Duration) -> Result<()> {
    let bar = spinner("Loading posts…");
    listing.initialize();
    let settled = listing.wait(timeout);
    bar.finish_and_clear();

    if !settled {
        return Err(anyhow!("timed out waiting for posts"));
    }
    if listing.state().all_posts().is_empty() {
        if let Some(err) = listing.last_error() {
            return Err(anyhow!("{err}"));
        }
    }

    let mut out = io::stdout().lock();
    write_listing(&mut out, listing.state())?;
    if !listing.categories().is_empty() {
        let names: Vec<&str> = listing
            .categories()
            .iter()
            .map(|category| category.name.as_str())
            .collect();
        writeln!(out, "Categories: {}", names.join(", "))?;
    }
    Ok(())
}

fn print_post(mut detail: DetailLoader, id: i64, timeout: Duration) -> Result<()> {
    let bar = spinner(&format!("Loading post {id}…"));
    detail.load(id);
    let settled = detail.wait(timeout);
    bar.finish_and_clear();

    if !settled {
        return Err(anyhow!("timed out waiting for post {id}"));
    }
    if !detail.is_loaded() {
        let reason = detail.last_error().unwrap_or("post unavailable");
        return Err(anyhow!("{reason}"));
    }

    let mut out = io::stdout().lock();
    write_post(&mut out, detail.post(), detail.hero_image_url())?;
    Ok(())
}

fn write_listing(out: &mut impl Write, state: &ListingState) -> io::Result<()> {
    let posts = state.visible_posts();
    if posts.is_empty() {
        writeln!(out, "No posts to show.")?;
        return Ok(());
    }
    for post in posts {
        writeln!(out, "[{}] {}", post.id, post.plain_title())?;
        writeln!(
            out,
            "     By {} · {}",
            post.author,
            format_display_date(&post.published_at)
        )?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "Page {} of {} · {} posts",
        state.current_page(),
        state.page_count(),
        state.filtered_posts().len()
    )?;
    Ok(())
}

fn write_post(out: &mut impl Write, post: &Post, hero: Option<&str>) -> io::Result<()> {
    if let Some(url) = hero {
        writeln!(out, "Image: {url}")?;
        writeln!(out)?;
    }
    writeln!(out, "{}", post.plain_title())?;
    writeln!(
        out,
        "By {} | {}",
        post.author,
        format_display_date(&post.published_at)
    )?;
    writeln!(out)?;
    for paragraph in markup::plain_paragraphs(&post.content).split("\n\n") {
        writeln!(out, "{}", textwrap::fill(paragraph, WRAP_WIDTH))?;
        writeln!(out)?;
    }
    if let Some(link) = post.link.as_deref() {
        writeln!(out, "{link}")?;
    }
    Ok(())
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/blog-tui/config.yaml".to_string()
    }
}
