use clap::Parser;
use std::path::PathBuf;

/// Keeps the VRChat name links of MPS officers in step with their guild roles.
#[derive(Parser, Debug)]
#[command(name = "mps-guard")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Settings file (defaults to settings/remote_settings.json on Linux,
    /// settings/test_settings.json elsewhere)
    #[arg(short, long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Guild membership snapshot: JSON object of member id to role ids.
    /// Re-read whenever it changes on disk.
    #[arg(short, long, value_name = "PATH")]
    pub members: PathBuf,

    /// Read role-change events as JSON lines on stdin
    #[arg(long)]
    pub role_events_stdin: bool,

    /// Run one reconciliation pass and exit
    #[arg(long)]
    pub once: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}
