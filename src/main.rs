use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use lyplus::config::{self, CacheStrategy};
use lyplus::lyrics::{LyricsPayload, SongInfo, SubtitleTrack};
use lyplus::translation::Action;
use lyplus::Engine;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lyplus", version, about = "Synced lyrics fetcher with translation and caching")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct SongArgs {
    title: String,
    artist: String,
    #[arg(long)]
    album: Option<String>,
    /// Duration in seconds.
    #[arg(long)]
    duration: Option<f64>,
    /// Video id, enables the caption fallback together with --subtitle-url.
    #[arg(long)]
    video_id: Option<String>,
    #[arg(long)]
    subtitle_url: Option<String>,
    #[arg(long)]
    subtitle_lang: Option<String>,
    /// Id of a local upload to use directly.
    #[arg(long)]
    song_id: Option<String>,
}

impl SongArgs {
    fn into_song(self) -> SongInfo {
        SongInfo {
            title: self.title,
            artist: self.artist,
            album: self.album,
            duration: self.duration,
            video_id: self.video_id,
            subtitle: self.subtitle_url.map(|url| SubtitleTrack {
                url,
                language: self.subtitle_lang,
            }),
            song_id: self.song_id,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch lyrics for a song.
    Fetch {
        #[command(flatten)]
        song: SongArgs,
        /// Skip caches and ask providers again.
        #[arg(long)]
        force: bool,
        /// Print the raw payload as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Translate or romanize lyrics.
    Translate {
        #[command(flatten)]
        song: SongArgs,
        /// translate, romanize or none.
        #[arg(long, default_value = "translate")]
        action: String,
        #[arg(long, default_value = "en")]
        target: String,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Clear the lyrics and translation caches (local uploads are kept).
    ResetCache,
    /// Show cache entry counts and size.
    CacheSize,
    /// Manage locally uploaded lyrics.
    Local {
        #[command(subcommand)]
        cmd: LocalCommand,
    },
    /// Print SponsorBlock segments for a video.
    Sponsor { video_id: String },
    /// Change a setting and save it to the config file.
    Set {
        #[command(subcommand)]
        setting: SetCommand,
    },
}

#[derive(Debug, Subcommand)]
enum LocalCommand {
    /// Upload an LRC or KPoe JSON file.
    Upload {
        title: String,
        artist: String,
        file: PathBuf,
        #[arg(long)]
        album: Option<String>,
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Replace the lyrics of an upload.
    Update { song_id: String, file: PathBuf },
    Delete { song_id: String },
    List,
    Show { song_id: String },
}

#[derive(Debug, Subcommand)]
enum SetCommand {
    /// none, moderate or aggressive.
    CacheStrategy { value: String },
    /// Preferred lyrics provider: kpoe, customKpoe, lrclib or local.
    Provider { name: String },
    CustomKpoeUrl { url: Option<String> },
    /// google or gemini, for both translation and romanization.
    Translator { name: String },
    GeminiKey { key: Option<String> },
    /// Force every translation to this language; omit to clear.
    TranslateTarget { lang: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("load config")?;

    match cli.command {
        Command::Fetch { song, force, json } => {
            let engine = Engine::open(&cfg)?;
            let resolved = engine.lyrics().resolve(&song.into_song(), force).await?;
            print_lyrics(&resolved.lyrics, json)?;
        }
        Command::Translate {
            song,
            action,
            target,
            force,
            json,
        } => {
            let action: Action = action.parse()?;
            let engine = Engine::open(&cfg)?;
            let lyrics = engine
                .translations()
                .resolve(&song.into_song(), action, &target, force)
                .await?;
            print_lyrics(&lyrics, json)?;
        }
        Command::ResetCache => {
            Engine::open(&cfg)?.reset_cache().await?;
            println!("Cache cleared.");
        }
        Command::CacheSize => {
            let stats = Engine::open(&cfg)?.cache_size().await?;
            println!("persisted entries: {}", stats.entries);
            println!("persisted bytes:   {}", stats.bytes);
            println!("memory lyrics:     {}", stats.memory_lyrics);
            println!("memory translations: {}", stats.memory_translations);
        }
        Command::Local { cmd } => {
            let engine = Engine::open(&cfg)?;
            let lyrics = engine.lyrics();
            let local = engine.local();
            match cmd {
                LocalCommand::Upload {
                    title,
                    artist,
                    file,
                    album,
                    duration,
                } => {
                    let mut song = SongInfo::new(title, artist);
                    song.album = album;
                    song.duration = duration;
                    let id = lyrics.upload_local(song, read_lyrics_file(&file)?).await?;
                    println!("{id}");
                }
                LocalCommand::Update { song_id, file } => {
                    lyrics.update_local(&song_id, read_lyrics_file(&file)?).await?;
                    println!("Updated {song_id}.");
                }
                LocalCommand::Delete { song_id } => {
                    lyrics.delete_local(&song_id).await?;
                    println!("Deleted {song_id}.");
                }
                LocalCommand::List => {
                    for entry in local.list().await? {
                        println!(
                            "{}\t{} - {}",
                            entry.song_id, entry.song_info.title, entry.song_info.artist
                        );
                    }
                }
                LocalCommand::Show { song_id } => {
                    let record = local
                        .get(&song_id)
                        .await?
                        .with_context(|| format!("no local lyrics with id {song_id}"))?;
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
            }
        }
        Command::Sponsor { video_id } => {
            let segments = Engine::open(&cfg)?.sponsor_segments(&video_id).await;
            println!("{}", serde_json::to_string_pretty(&segments)?);
        }
        Command::Set { setting } => {
            let mut cfg = cfg;
            let s = &mut cfg.settings;
            match setting {
                SetCommand::CacheStrategy { value } => {
                    s.cache_strategy = match value.as_str() {
                        "none" => CacheStrategy::None,
                        "moderate" => CacheStrategy::Moderate,
                        "aggressive" => CacheStrategy::Aggressive,
                        other => anyhow::bail!("unknown cache strategy: {other}"),
                    };
                }
                SetCommand::Provider { name } => s.lyrics_provider = name,
                SetCommand::CustomKpoeUrl { url } => s.custom_kpoe_url = url,
                SetCommand::Translator { name } => {
                    s.translation_provider = name.clone();
                    s.romanization_provider = name;
                }
                SetCommand::GeminiKey { key } => s.gemini_api_key = key,
                SetCommand::TranslateTarget { lang } => {
                    s.override_translate_target = lang.is_some();
                    s.custom_translate_target = lang;
                }
            }
            config::save(&cfg, cli.config.as_deref()).context("save config")?;
            println!("Updated config settings.");
        }
    }

    Ok(())
}

/// JSON files are treated as KPoe payloads, anything else as LRC text.
fn read_lyrics_file(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    } else {
        Ok(serde_json::Value::String(raw))
    }
}

fn print_lyrics(lyrics: &LyricsPayload, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(lyrics)?);
        return Ok(());
    }

    for line in &lyrics.data {
        match line.time {
            Some(ms) => print!("[{:02}:{:02}.{:02}] ", ms / 60_000, (ms / 1000) % 60, (ms % 1000) / 10),
            None => print!("           "),
        }
        println!("{}", line.text);
        for extra in [&line.romanized_text, &line.translated_text].into_iter().flatten() {
            println!("           {extra}");
        }
    }
    Ok(())
}
