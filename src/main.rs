use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use playlist_dedup::cache::{PlaylistCache, SqliteStore};
use playlist_dedup::config::{cache_path_from_env, AppConfig};
use playlist_dedup::logging::{init_logging, LogFormat};
use playlist_dedup::models::{
    DeleteTarget, DuplicateRecord, MatchType, PlaylistTrackEntry, PlaylistTracks, VariationType,
};
use playlist_dedup::progress::{set_log_only, with_spinner};
use playlist_dedup::selection::CompareStats;
use playlist_dedup::service::{CompareReport, DedupService, DeleteReport, DeleteRequest, TargetOutcome};
use playlist_dedup::spotify::{PlaylistProvider, SpotifyClient};
use playlist_dedup::{find_duplicates, Selection};

#[derive(Parser, Debug)]
#[command(name = "playlist-dedup")]
#[command(about = "Find and remove tracks that appear in two playlists, including live/remix/remaster variants")]
struct Cli {
    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Hide spinners (tail-friendly output)
    #[arg(long, global = true)]
    log_only: bool,

    /// SQLite snapshot cache (default: PLAYLIST_CACHE_PATH or playlist-cache.sqlite3)
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Log level for this crate (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List your playlists with track counts
    Playlists,

    /// Compare two playlists and list the right-side duplicates
    Compare(CompareArgs),

    /// Compare two exported playlist JSON files offline
    Files(FilesArgs),

    /// Remove tracks from one or both playlists
    Delete(DeleteArgs),

    /// Compare, select, remove, then compare again
    Dedupe(DedupeArgs),

    /// Inspect or clear the snapshot cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Parser, Debug)]
struct CompareArgs {
    /// Reference playlist id
    left: String,

    /// Playlist checked against the reference
    right: String,
}

#[derive(Parser, Debug)]
struct FilesArgs {
    /// Exported left playlist (PlaylistTracks JSON or an array of entries)
    left: PathBuf,

    right: PathBuf,
}

#[derive(Parser, Debug)]
struct DeleteArgs {
    #[arg(long, value_enum, default_value_t = DeleteTarget::Both)]
    from: DeleteTarget,

    #[arg(long)]
    left: Option<String>,

    #[arg(long)]
    right: Option<String>,

    /// Track URIs to remove
    #[arg(required = true)]
    uris: Vec<String>,
}

#[derive(Parser, Debug)]
struct DedupeArgs {
    left: String,

    right: String,

    /// Playlist(s) to remove the selected duplicates from
    #[arg(long, value_enum, default_value_t = DeleteTarget::Right)]
    from: DeleteTarget,

    /// Select every duplicate of this variation (repeatable)
    #[arg(long = "variation", value_enum)]
    variations: Vec<VariationType>,

    /// Select similar duplicates without a variation qualifier
    #[arg(long)]
    unqualified: bool,

    /// Select exact matches
    #[arg(long)]
    exact: bool,

    /// Show what would be removed without removing it
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Entry count and approximate size
    Stats,
    /// Remove every cached playlist
    Clear,
}

/// Exported playlist file: either the full listing or just its entries.
#[derive(Deserialize)]
#[serde(untagged)]
enum TrackFile {
    Tracks(PlaylistTracks),
    Entries(Vec<PlaylistTrackEntry>),
}

impl TrackFile {
    fn into_entries(self) -> Vec<PlaylistTrackEntry> {
        match self {
            TrackFile::Tracks(tracks) => tracks.items,
            TrackFile::Entries(entries) => entries,
        }
    }
}

type Service = DedupService<SpotifyClient, SqliteStore>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    set_log_only(cli.log_only);
    init_logging(&cli.log_level, cli.log_format)?;

    match &cli.cmd {
        Command::Playlists => {
            let service = build_service(&cli).await?;
            run_playlists(&service, cli.json).await
        }
        Command::Compare(args) => {
            let service = build_service(&cli).await?;
            let report = compare(&service, &args.left, &args.right).await?;
            print_report(&report, cli.json)
        }
        Command::Files(args) => run_files(args, cli.json),
        Command::Delete(args) => {
            let service = build_service(&cli).await?;
            run_delete(&service, args, cli.json).await
        }
        Command::Dedupe(args) => {
            let service = build_service(&cli).await?;
            run_dedupe(&service, args, cli.json).await
        }
        Command::Cache { action } => run_cache(&cli, action, cli.json),
    }
}

fn cache_path(cli: &Cli, config: Option<&AppConfig>) -> PathBuf {
    cli.cache
        .clone()
        .or_else(|| config.map(|c| c.cache_path.clone()))
        .unwrap_or_else(cache_path_from_env)
}

fn open_store(path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(path).with_context(|| format!("Failed to open cache {:?}", path))
}

async fn build_service(cli: &Cli) -> Result<Service> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let store = open_store(&cache_path(cli, Some(&config)))?;
    let client = SpotifyClient::connect(&config)
        .await
        .context("Failed to connect to Spotify")?;
    Ok(DedupService::new(client, store))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

async fn run_playlists(service: &Service, json: bool) -> Result<()> {
    let user = service
        .provider()
        .current_user()
        .await
        .context("Failed to fetch user")?;
    info!("Signed in as {}", user.display_name.as_deref().unwrap_or(&user.id));

    let listing = with_spinner("Fetching playlists", service.list_playlists())
        .await
        .context("Failed to fetch playlists")?;

    if json {
        return print_json(&listing);
    }

    for playlist in &listing.playlists {
        println!("{:<24} {:>6}  {}", playlist.id, playlist.tracks.total, playlist.name);
    }
    println!();
    println!(
        "{} playlists (cache: {} hits, {} misses, {:.1}% hit rate)",
        listing.playlists.len(),
        listing.cache_hits,
        listing.cache_misses,
        listing.hit_rate()
    );
    Ok(())
}

async fn compare(service: &Service, left: &str, right: &str) -> Result<CompareReport> {
    let report = with_spinner("Comparing playlists", service.compare(Some(left), Some(right)))
        .await
        .context("Failed to compare playlists")?;
    Ok(report)
}

fn run_files(args: &FilesArgs, json: bool) -> Result<()> {
    let read = |path: &Path| -> Result<Vec<PlaylistTrackEntry>> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let file: TrackFile =
            serde_json::from_str(&raw).with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(file.into_entries())
    };

    let left = read(&args.left)?;
    let right = read(&args.right)?;
    let duplicates = find_duplicates(&left, &right);
    let stats = CompareStats::new(left.len(), right.len(), &duplicates);

    print_report(&CompareReport { duplicates, stats }, json)
}

async fn run_delete(service: &Service, args: &DeleteArgs, json: bool) -> Result<()> {
    let request = DeleteRequest {
        left_playlist_id: args.left.clone(),
        right_playlist_id: args.right.clone(),
        track_uris: args.uris.clone(),
        delete_from: args.from,
    };
    let report = service.delete(request).await.context("Failed to delete tracks")?;
    print_delete(&report, json)?;
    if !report.success() {
        bail!("Deletion incomplete (status {})", report.status_code());
    }
    Ok(())
}

async fn run_dedupe(service: &Service, args: &DedupeArgs, json: bool) -> Result<()> {
    let report = compare(service, &args.left, &args.right).await?;
    let records = &report.duplicates;

    let mut selection = Selection::new(args.from);
    if args.variations.is_empty() && !args.unqualified && !args.exact {
        selection.toggle_all(records);
    } else {
        let mut toggled: Vec<VariationType> = Vec::new();
        for &variation in &args.variations {
            if !toggled.contains(&variation) {
                selection.toggle_variation(records, Some(variation));
                toggled.push(variation);
            }
        }
        if args.unqualified {
            let unqualified: Vec<DuplicateRecord> = records
                .iter()
                .filter(|r| r.match_type == MatchType::Similar)
                .cloned()
                .collect();
            selection.toggle_variation(&unqualified, None);
        }
        if args.exact {
            selection.select_match_type(records, MatchType::Exact);
        }
    }

    let uris = selection.selected_uris(records);
    if uris.is_empty() {
        println!("Nothing selected ({} duplicates found)", report.stats.duplicates_found);
        return Ok(());
    }

    if args.dry_run {
        if json {
            return print_json(&uris);
        }
        for uri in &uris {
            println!("{}", uri);
        }
        println!(
            "Would remove {} tracks from {}",
            uris.len(),
            selection.delete_from.as_str()
        );
        return Ok(());
    }

    let request = DeleteRequest {
        left_playlist_id: Some(args.left.clone()),
        right_playlist_id: Some(args.right.clone()),
        track_uris: uris,
        delete_from: selection.delete_from,
    };
    let deleted = service.delete(request).await.context("Failed to delete tracks")?;
    print_delete(&deleted, json)?;

    let refreshed = compare(service, &args.left, &args.right).await?;
    if json {
        print_json(&refreshed.stats)?;
    } else {
        print_stats(&refreshed.stats);
    }

    if !deleted.success() {
        bail!("Deletion incomplete (status {})", deleted.status_code());
    }
    Ok(())
}

fn run_cache(cli: &Cli, action: &CacheAction, json: bool) -> Result<()> {
    let cache = PlaylistCache::new(open_store(&cache_path(cli, None))?);
    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            if json {
                return print_json(&stats);
            }
            println!("Entries: {}  Size: {} KB", stats.total, stats.size_kb);
        }
        CacheAction::Clear => {
            let removed = cache.clear() + cache.clear_old_versions();
            println!("Removed {} cache entries", removed);
        }
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_report(report: &CompareReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }

    for group in report.groups() {
        println!("{} ({})", group.label(), group.records.len());
        for record in &group.records {
            let track = &record.track;
            let kind = match record.match_type {
                MatchType::Exact => "exact",
                MatchType::Similar => "similar",
            };
            println!(
                "  [{:<7}] {} - {} ({})  {}",
                kind,
                track.name,
                track.primary_artist().unwrap_or("Unknown"),
                track.formatted_duration(),
                track.uri
            );
        }
    }
    print_stats(&report.stats);
    Ok(())
}

fn print_stats(stats: &CompareStats) {
    println!(
        "Left: {} tracks | Right: {} tracks | Duplicates: {}",
        stats.left_total, stats.right_total, stats.duplicates_found
    );
}

fn print_delete(report: &DeleteReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    for (side, outcome) in [("left", &report.left), ("right", &report.right)] {
        match outcome {
            Some(TargetOutcome::Removed {
                snapshot_id,
                removed,
            }) => println!("{}: removed {} (snapshot {})", side, removed, snapshot_id),
            Some(TargetOutcome::Failed { error, removed, .. }) => {
                println!("{}: failed after removing {} ({})", side, removed, error)
            }
            None => {}
        }
    }
    println!("Removed {} tracks", report.deleted_count);
    Ok(())
}
