//! Prepare manga chapters for reading: cut strips into pages, cache them, and
//! keep the next chapters ready.

mod error;
mod logging;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use exn::{OptionExt, ResultExt};
use folio_cache::{ChapterCache, ChapterNumber, ChapterRef, MangaId};
use folio_config::Config;
use folio_pipeline::{
    ChapterList, ChapterProcessingPipeline, ChapterState, PipelineOptions, PrefetchScheduler, StorageSource,
};
use folio_storage::backend::{ImageOnlyBackend, LocalBackend};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "folio", version, about)]
struct Args {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(long, short, env = "FOLIO_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open a chapter and print the paths of its pages, prefetching the
    /// chapters after it.
    Open {
        manga: String,
        chapter: String,
        /// Also wait for the prefetched chapters.
        #[arg(long)]
        wait: bool,
        /// Open the chapter after the one given (the last one stays put).
        #[arg(long, conflicts_with = "previous")]
        next: bool,
        /// Open the chapter before the one given (the first one stays put).
        #[arg(long)]
        previous: bool,
    },
    /// Process every chapter of a manga.
    Prefetch { manga: String },
    /// List a manga's chapters and whether each one is cached.
    Status { manga: String },
    /// Drop a chapter's cached pages.
    Invalidate { manga: String, chapter: String },
}

struct App {
    cache_root: PathBuf,
    cache: Arc<ChapterCache>,
    pipeline: ChapterProcessingPipeline,
    scheduler: PrefetchScheduler,
}
impl App {
    async fn build(config: &Config) -> Result<Self> {
        let cache_backend = LocalBackend::new("cache", &config.cache.root).or_raise(|| ErrorKind::Storage)?;
        let cache = Arc::new(ChapterCache::new(Arc::new(cache_backend)));
        cache.sweep_staging().await.or_raise(|| ErrorKind::Cache)?;

        let library = LocalBackend::new("library", &config.source.root).or_raise(|| ErrorKind::Storage)?;
        let source = StorageSource::new(Arc::new(ImageOnlyBackend::new(Arc::new(library))));
        let pipeline = ChapterProcessingPipeline::new(Arc::new(source), cache.clone(), PipelineOptions::from(config))
            .or_raise(|| ErrorKind::Pipeline)?;
        let scheduler = PrefetchScheduler::new(pipeline.clone(), config.prefetch.window);
        Ok(Self {
            cache_root: config.cache.root.clone(),
            cache,
            pipeline,
            scheduler,
        })
    }

    async fn open(&self, chapter: &ChapterRef, wait: bool) -> Result<()> {
        if let Err(err) = self.scheduler.set_current_chapter(chapter).await {
            tracing::warn!(error = ?err, "not prefetching");
        }
        let pages = self.pipeline.open_chapter(chapter).await.or_raise(|| ErrorKind::Pipeline)?;
        for page in pages.iter() {
            println!("{}", self.cache_root.join(ChapterCache::page_path(chapter, page.index)).display());
        }
        if wait {
            self.pipeline.settled().await;
        }
        Ok(())
    }

    async fn list(&self, manga: &MangaId) -> Result<ChapterList> {
        ChapterList::fetch(&**self.pipeline.source(), manga).await.or_raise(|| ErrorKind::Source)
    }

    async fn prefetch(&self, manga: &MangaId) -> Result<()> {
        let window = self.scheduler.prefetch_all(manga).await.or_raise(|| ErrorKind::Source)?;
        self.pipeline.settled().await;
        let (mut cached, mut failed) = (0, 0);
        for chapter in &window {
            match self.pipeline.state(chapter) {
                ChapterState::Cached => cached += 1,
                ChapterState::Failed(failure) => {
                    failed += 1;
                    println!("{chapter}: {failure}");
                },
                _ => {},
            }
        }
        println!("{manga}: {cached} of {} chapters cached, {failed} failed", window.len());
        Ok(())
    }

    async fn status(&self, manga: &MangaId) -> Result<()> {
        let list = self.list(manga).await?;
        let cached = self.cache.chapters(manga).await.or_raise(|| ErrorKind::Cache)?;
        for chapter in list.numbers() {
            let mark = if cached.contains(chapter) { "cached" } else { "-" };
            println!("{:>8}  {mark}", chapter.to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Stay,
    Next,
    Previous,
}
impl Step {
    fn new(next: bool, previous: bool) -> Self {
        match (next, previous) {
            (true, _) => Self::Next,
            (_, true) => Self::Previous,
            _ => Self::Stay,
        }
    }

    fn apply(self, list: &ChapterList, chapter: ChapterRef) -> Result<ChapterRef> {
        let moved = match self {
            Self::Stay => return Ok(chapter),
            Self::Next => list.next(&chapter.chapter),
            Self::Previous => list.previous(&chapter.chapter),
        };
        moved.ok_or_raise(|| ErrorKind::Argument(format!("{} has no chapters", chapter.manga)))
    }
}

fn manga(raw: &str) -> Result<MangaId> {
    raw.parse::<MangaId>().or_raise(|| ErrorKind::Argument(format!("manga {raw:?}")))
}

fn chapter(manga_raw: &str, chapter_raw: &str) -> Result<ChapterRef> {
    let number: ChapterNumber =
        chapter_raw.parse::<ChapterNumber>().or_raise(|| ErrorKind::Argument(format!("chapter {chapter_raw:?}")))?;
    Ok(ChapterRef::new(manga(manga_raw)?, number))
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    tracing::debug!(cache = %config.cache.root.display(), source = %config.source.root.display(), "configured");
    let app = App::build(&config).await?;
    match args.command {
        Command::Open { manga, chapter: number, wait, next, previous } => {
            let chapter = chapter(&manga, &number)?;
            let step = Step::new(next, previous);
            let chapter = match step {
                Step::Stay => chapter,
                _ => step.apply(&app.list(&chapter.manga).await?, chapter)?,
            };
            app.open(&chapter, wait).await
        },
        Command::Prefetch { manga: raw } => app.prefetch(&manga(&raw)?).await,
        Command::Status { manga: raw } => app.status(&manga(&raw)?).await,
        Command::Invalidate { manga, chapter: number } => {
            let chapter = chapter(&manga, &number)?;
            app.pipeline.invalidate(&chapter).await.or_raise(|| ErrorKind::Pipeline)?;
            tracing::info!(%chapter, "invalidated");
            Ok(())
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let args = Args::parse();
    let outcome = tokio::select! {
        outcome = run(args) => outcome,
        _ = tokio::signal::ctrl_c() => Err(exn::Exn::from(ErrorKind::Interrupted)),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}
