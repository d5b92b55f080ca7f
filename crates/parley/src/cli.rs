use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley - streaming chat with local tools", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Record backend exchanges to fixture directory for replay testing
    #[arg(long, global = true, conflicts_with = "replay")]
    pub record: Option<PathBuf>,

    /// Replay backend exchanges from fixture directory (no network)
    #[arg(long, global = true, conflicts_with = "record")]
    pub replay: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new config file
    Init {
        /// Path for new config file
        #[arg(default_value = "parley.toml")]
        path: PathBuf,
    },
    /// Interactive chat; Ctrl-C cancels the reply in progress
    Chat,
    /// Print the tool schemas advertised to the backend
    Tools,
}

/// Expand `~` and env vars in a user-supplied path
pub fn expand_path(path: &std::path::Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}
