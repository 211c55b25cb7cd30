use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mediasrc::config::Settings;
use mediasrc::filters::FilterList;
use mediasrc::types::{Chapter, Episode, Series};
use mediasrc::{AnySource, SourceRegistry};

#[derive(Debug, Parser)]
#[command(
    name = "mediasrc",
    about = "Browse anime and manga sources and print what they return as JSON.",
    version
)]
struct Cli {
    /// Config file; defaults to the per-user config directory.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log requests and skipped items to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Anime,
    Manga,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List registered sources.
    List {
        #[arg(long, value_enum)]
        kind: Option<Kind>,
    },
    Popular {
        source: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Latest {
        source: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Search {
        source: String,
        #[arg(value_name = "QUERY")]
        query: Vec<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// `name=value`; repeat for several filters.
        #[arg(long = "filter", value_name = "NAME=VALUE")]
        filters: Vec<String>,
    },
    /// Show the filters a source accepts.
    Filters { source: String },
    Details { source: String, url: String },
    Episodes { source: String, url: String },
    Videos { source: String, url: String },
    Chapters { source: String, url: String },
    Pages { source: String, url: String },
}

#[derive(Debug, Serialize)]
struct SourceSummary<'a> {
    id: u64,
    name: &'a str,
    lang: &'a str,
    kind: &'static str,
    base_url: &'a str,
    supports_latest: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let result = run().await;
    if let Err(err) = &result {
        eprintln!("error: {err:?}");
    }
    result
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref()).context("failed to load configuration")?;
    debug!(config = ?cli.config, concurrency = settings.concurrency, "settings loaded");
    let registry = SourceRegistry::new(&settings).context("failed to build sources")?;

    match cli.command {
        Command::List { kind } => {
            let sources = registry.all();
            let summaries: Vec<_> = sources
                .iter()
                .filter(|source| match kind {
                    Some(Kind::Anime) => matches!(source, AnySource::Anime(_)),
                    Some(Kind::Manga) => matches!(source, AnySource::Manga(_)),
                    None => true,
                })
                .map(|source| {
                    let info = source.info();
                    SourceSummary {
                        id: info.id,
                        name: &info.name,
                        lang: &info.lang,
                        kind: source.kind(),
                        base_url: &info.base_url,
                        supports_latest: info.supports_latest,
                    }
                })
                .collect();
            print_json(&summaries)
        }
        Command::Popular { source, page } => match lookup(&registry, &source)? {
            AnySource::Anime(s) => print_json(&s.popular(page).await?),
            AnySource::Manga(s) => print_json(&s.popular(page).await?),
        },
        Command::Latest { source, page } => match lookup(&registry, &source)? {
            AnySource::Anime(s) => print_json(&s.latest(page).await?),
            AnySource::Manga(s) => print_json(&s.latest(page).await?),
        },
        Command::Search {
            source,
            query,
            page,
            filters,
        } => {
            let query = query.join(" ");
            match lookup(&registry, &source)? {
                AnySource::Anime(s) => {
                    if !filters.is_empty() {
                        s.refresh_filters().await?;
                    }
                    let list = apply_filters(s.filters(), &filters)?;
                    print_json(&s.search(page, &query, &list).await?)
                }
                AnySource::Manga(s) => {
                    if !filters.is_empty() {
                        s.refresh_filters().await?;
                    }
                    let list = apply_filters(s.filters(), &filters)?;
                    print_json(&s.search(page, &query, &list).await?)
                }
            }
        }
        Command::Filters { source } => match lookup(&registry, &source)? {
            AnySource::Anime(s) => {
                s.refresh_filters().await?;
                print_json(&s.filters())
            }
            AnySource::Manga(s) => {
                s.refresh_filters().await?;
                print_json(&s.filters())
            }
        },
        Command::Details { source, url } => {
            let series = Series::new(url, "");
            match lookup(&registry, &source)? {
                AnySource::Anime(s) => print_json(&s.details(&series).await?),
                AnySource::Manga(s) => print_json(&s.details(&series).await?),
            }
        }
        Command::Episodes { source, url } => {
            let AnySource::Anime(s) = lookup(&registry, &source)? else {
                bail!("`{source}` is a manga source; use `chapters`");
            };
            print_json(&s.episodes(&Series::new(url, "")).await?)
        }
        Command::Videos { source, url } => {
            let AnySource::Anime(s) = lookup(&registry, &source)? else {
                bail!("`{source}` is a manga source; use `pages`");
            };
            print_json(&s.videos(&Episode::new(url, "", 0.0)).await?)
        }
        Command::Chapters { source, url } => {
            let AnySource::Manga(s) = lookup(&registry, &source)? else {
                bail!("`{source}` is an anime source; use `episodes`");
            };
            print_json(&s.chapters(&Series::new(url, "")).await?)
        }
        Command::Pages { source, url } => {
            let AnySource::Manga(s) = lookup(&registry, &source)? else {
                bail!("`{source}` is an anime source; use `videos`");
            };
            print_json(&s.pages(&Chapter::new(url, "", -1.0)).await?)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "mediasrc=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn lookup(registry: &SourceRegistry, name: &str) -> Result<AnySource> {
    registry.by_name(name).ok_or_else(|| {
        let known: Vec<String> = registry.all().iter().map(|s| s.info().name.clone()).collect();
        anyhow!("unknown source `{name}`; known sources: {}", known.join(", "))
    })
}

fn apply_filters(mut list: FilterList, raw: &[String]) -> Result<FilterList> {
    for pair in raw {
        let (name, value) = pair
            .split_once('=')
            .with_context(|| format!("filter `{pair}` is not name=value"))?;
        list.apply_state(name.trim(), value)
            .with_context(|| format!("failed to apply filter `{pair}`"))?;
    }
    Ok(list)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{out}");
    Ok(())
}
