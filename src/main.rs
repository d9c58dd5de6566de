use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use trackvault::location::location_for_path;
use trackvault::paths::PathConfig;
use trackvault::{
    logging, ChannelNotifier, DownloadRequest, Downloader, JsonLedger, Ledger, LocationProvider,
    Notification, SettingsStore, Track, TrackCache,
};

/// Download tracks into a music folder and look them up again.
#[derive(Parser, Debug)]
#[command(name = "trackvault", version, about)]
struct Cli {
    /// Keep settings, ledger and logs under this directory instead of the platform defaults.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show or change the download folder.
    #[command(subcommand)]
    Location(LocationCommand),
    /// Download a track from a stream URL.
    Download(DownloadArgs),
    /// Print the local file for a track, if a verified copy exists.
    Resolve(TrackArgs),
    /// Delete the local file for a track.
    Delete(TrackArgs),
    /// List every verified file in the download folder.
    List,
    /// Rescan the download folder against the ledger.
    Refresh,
    /// Print the recorded sizes.
    Ledger,
    /// Print where settings, ledger and logs are kept.
    Paths,
}

#[derive(Subcommand, Debug)]
enum LocationCommand {
    /// Use a directory (path or file:// URI) for downloads.
    Set { location: String },
    /// Forget the download folder. This also drops every recorded size.
    Clear,
    Show,
}

#[derive(Args, Debug)]
struct TrackArgs {
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    artist: String,
    #[arg(long, default_value = "")]
    album: String,
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// http(s) URL of the audio stream.
    url: String,
    #[arg(long)]
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    artist: Option<String>,
    #[arg(long)]
    album: Option<String>,
    /// Extension to use when the server does not send a known audio type.
    #[arg(long)]
    suffix: Option<String>,
    /// Duration in seconds.
    #[arg(long)]
    duration: Option<u32>,
    /// Name to use when the track has no title.
    #[arg(long)]
    fallback_name: Option<String>,
}

impl TrackArgs {
    fn track(&self) -> Track {
        let mut track = Track::new("", self.title.clone());
        if !self.artist.is_empty() {
            track = track.with_artist(self.artist.clone());
        }
        if !self.album.is_empty() {
            track = track.with_album(self.album.clone());
        }
        track
    }
}

impl DownloadArgs {
    fn request(self) -> DownloadRequest {
        let track = Track {
            id: self.id,
            title: self.title,
            artist: self.artist,
            album: self.album,
            suffix: self.suffix,
            duration: self.duration,
        };
        let mut request = DownloadRequest::new(track, self.url);
        if let Some(name) = self.fallback_name {
            request = request.with_fallback_name(name);
        }
        request
    }
}

struct App {
    settings: Arc<SettingsStore>,
    ledger: Arc<JsonLedger>,
    cache: Arc<TrackCache>,
}

impl App {
    fn open(paths: &PathConfig) -> anyhow::Result<Self> {
        let settings = Arc::new(SettingsStore::load(&paths.settings_file));
        let ledger = Arc::new(
            JsonLedger::open(&paths.ledger_file).context("failed to open download ledger")?,
        );
        let cache = Arc::new(TrackCache::new(settings.clone(), ledger.clone()));
        Ok(Self {
            settings,
            ledger,
            cache,
        })
    }
}

fn print_notifications(rx: &mut UnboundedReceiver<Notification>) -> anyhow::Result<()> {
    while let Ok(notification) = rx.try_recv() {
        println!("{}", serde_json::to_string(&notification.to_event())?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = PathConfig::new(cli.root.as_deref()).context("failed to prepare app directories")?;
    logging::init(&paths.logs, cli.verbose).context("failed to initialize logging")?;

    let app = App::open(&paths)?;

    match cli.command {
        Commands::Location(LocationCommand::Set { location }) => {
            let location = match PathBuf::from(&location).canonicalize() {
                Ok(dir) if dir.is_dir() => location_for_path(&dir),
                _ => location,
            };
            app.settings.set_download_directory(location.clone())?;
            app.cache.ensure_fresh();
            println!("{}", location);
        }
        Commands::Location(LocationCommand::Clear) => {
            app.settings.clear_download_directory()?;
            app.cache.ensure_fresh();
        }
        Commands::Location(LocationCommand::Show) => match app.settings.configured_location() {
            Some(location) => println!("{}", location),
            None => println!("(not set)"),
        },
        Commands::Download(args) => {
            let (notifier, mut rx) = ChannelNotifier::new();
            let downloader =
                Downloader::new(app.cache.clone(), Arc::new(notifier), &app.settings.snapshot())?;
            let outcome = downloader.download(args.request()).await?;
            print_notifications(&mut rx)?;
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }
        Commands::Resolve(args) => match app.cache.resolve_track(&args.track()) {
            Some(path) => println!("{}", path.display()),
            None => std::process::exit(1),
        },
        Commands::Delete(args) => {
            if !app.cache.delete(&args.track()) {
                eprintln!("nothing deleted");
                std::process::exit(1);
            }
        }
        Commands::List => {
            for file in app.cache.entries() {
                println!("{}\t{}", file.size, file.path.display());
            }
        }
        Commands::Refresh => {
            app.cache.refresh();
            println!("{} verified files", app.cache.entries().len());
        }
        Commands::Ledger => {
            let mut sizes: Vec<_> = app.ledger.snapshot().into_iter().collect();
            sizes.sort();
            for (key, size) in sizes {
                println!("{}\t{}", size, key);
            }
        }
        Commands::Paths => println!("{}", paths.to_json()?),
    }

    Ok(())
}
