//! ncm-unblock command-line front end

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use ncm_unblock::api::{DETAIL_SUBSCRIBERS, NcmCatalog, PlayListField};
use ncm_unblock::config::Settings;
use ncm_unblock::fallback::Unblocker;

#[derive(Parser, Debug)]
#[clap(name = "ncm-unblock")]
#[clap(about = "Resolve playable URLs for NetEase Cloud Music tracks")]
struct Args {
    /// Settings file to use instead of the one in the config directory
    #[clap(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// NetEase cookie header, e.g. "MUSIC_U=...; __csrf=..."
    #[clap(long, value_name = "HEADER")]
    cookie: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Search the fallback sources only
    Resolve { id: u64 },
    /// Report whether the track can be played at all
    Check { id: u64 },
    /// Catalog URL, falling back to the other sources
    Url { id: u64 },
    /// Playlist detail, categories and edits
    #[clap(subcommand)]
    Playlist(PlaylistCommand),
    /// Daily recommendations for the logged-in user
    #[clap(subcommand)]
    Recommend(RecommendCommand),
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum PlaylistCommand {
    /// Playlist header and tracks
    Detail {
        id: u64,
        /// Collaborators to include
        #[clap(long, default_value_t = DETAIL_SUBSCRIBERS)]
        subscribers: u32,
    },
    /// All playlist categories
    Categories,
    /// Hot playlist tags
    HotTags,
    /// Set name, description and tags together
    Update {
        id: u64,
        #[clap(long)]
        name: String,
        #[clap(long, default_value = "")]
        desc: String,
        #[clap(long, default_value = "")]
        tags: String,
    },
    Rename { id: u64, name: String },
    Describe { id: u64, desc: String },
    /// Replace tags, separated by ';'
    Tag { id: u64, tags: String },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum RecommendCommand {
    Playlists,
    Songs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => Settings::load_from_file(path)?,
        None => Settings::load(),
    };
    let cookie = args.cookie.as_deref();

    match args.command {
        Command::Resolve { id } => {
            let unblocker = Unblocker::from_settings(&settings, cookie)?;
            print_url(id, unblocker.resolve(id).await);
        }
        Command::Url { id } => {
            let unblocker = Unblocker::from_settings(&settings, cookie)?;
            print_url(id, unblocker.play_url(id).await);
        }
        Command::Check { id } => {
            let unblocker = Unblocker::from_settings(&settings, cookie)?;
            let answer = unblocker.check_playable(id).await?;
            info!("Track {} playable: {}", id, answer.playable);
            println!("{}", serde_json::to_string(&answer)?);
        }
        Command::Playlist(command) => {
            let catalog = NcmCatalog::from_settings(&settings, cookie)?;
            playlist(&catalog, command).await?;
        }
        Command::Recommend(command) => {
            let catalog = NcmCatalog::from_settings(&settings, cookie)?;
            match command {
                RecommendCommand::Playlists => print_json(&catalog.recommend_resource().await?)?,
                RecommendCommand::Songs => print_json(&catalog.recommend_songs().await?)?,
            }
        }
    }
    Ok(())
}

async fn playlist(catalog: &NcmCatalog, command: PlaylistCommand) -> Result<()> {
    match command {
        PlaylistCommand::Detail { id, subscribers } => {
            print_json(&catalog.playlist_detail(id, subscribers).await?)
        }
        PlaylistCommand::Categories => print_json(&catalog.playlist_categories().await?),
        PlaylistCommand::HotTags => print_json(&catalog.hot_playlist_tags().await?),
        PlaylistCommand::Update {
            id,
            name,
            desc,
            tags,
        } => catalog.update_playlist(id, &name, &desc, &tags).await,
        PlaylistCommand::Rename { id, name } => {
            catalog
                .update_playlist_field(id, PlayListField::Name, &name)
                .await
        }
        PlaylistCommand::Describe { id, desc } => {
            catalog
                .update_playlist_field(id, PlayListField::Desc, &desc)
                .await
        }
        PlaylistCommand::Tag { id, tags } => {
            catalog
                .update_playlist_field(id, PlayListField::Tags, &tags)
                .await
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_url(id: u64, url: String) {
    if url.is_empty() {
        warn!("No playable url found for track {}", id);
    }
    println!("{}", url);
}
