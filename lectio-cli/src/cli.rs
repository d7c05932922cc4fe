use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Course video download and decryption tool",
    long_about = "Downloads a trainer -> course -> lesson catalog of video content,\n\
                  resolves each lesson's HLS manifest, fetches the encrypted media\n\
                  segments resumably, and decrypts them into one continuous stream\n\
                  per lesson. Re-running a partial download skips segments that are\n\
                  already on disk."
)]
pub struct CliArgs {
    /// Trainer ids to download
    #[arg(help = "Trainer id(s) to process; see also --trainers-file")]
    pub trainers: Vec<String>,

    /// File with one trainer id per line
    #[arg(
        long,
        help = "Read trainer ids from a file, one per line (blank lines ignored)"
    )]
    pub trainers_file: Option<PathBuf>,

    /// Base URL of the remote service
    #[arg(
        short = 'u',
        long,
        help = "Service root the API endpoints resolve against (required unless --decrypt-only)"
    )]
    pub base_url: Option<String>,

    /// Output directory for downloaded content
    #[arg(
        short,
        long,
        help = "Directory where downloaded content is stored (default: ./download)"
    )]
    pub output_dir: Option<PathBuf>,

    /// Cookie jar file holding the session cookie header line
    #[arg(
        long,
        default_value = "cookies.txt",
        help = "File holding the raw Cookie header line for the remote service"
    )]
    pub cookies: PathBuf,

    /// Run only the decryption stage over on-disk state
    #[arg(
        long,
        help = "Skip all network activity and re-run decryption from already-downloaded segments"
    )]
    pub decrypt_only: bool,

    /// Number of concurrent segment downloads per lesson
    #[arg(
        long,
        default_value = "4",
        help = "Maximum number of concurrent segment downloads per lesson"
    )]
    pub concurrency: usize,

    /// Overall timeout in seconds for HTTP requests
    #[arg(
        long,
        default_value = "30",
        help = "Overall timeout in seconds for HTTP requests; use 0 for unlimited"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Show progress bars for operations
    #[arg(
        short = 'P',
        long = "progress",
        help = "Show per-lesson progress bars for segment downloads"
    )]
    pub show_progress: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}
