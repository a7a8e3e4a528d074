pub mod commands;
pub mod render;

use camino::Utf8PathBuf;
use clap::{Args, ValueEnum};
use platypus_scanner::{MediaKind, ScanOptions};

pub const EXIT_FAILURE: u8 = 1;
/// Conventional shell code for a process stopped by SIGINT.
pub const EXIT_CANCELLED: u8 = 130;

#[derive(ValueEnum, Clone, Debug, Copy)]
pub enum CliMediaKind {
    Audio,
    Video,
}

impl From<CliMediaKind> for MediaKind {
    fn from(m: CliMediaKind) -> Self {
        match m {
            CliMediaKind::Audio => MediaKind::Audio,
            CliMediaKind::Video => MediaKind::Video,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct DupesArgs {
    pub path: Utf8PathBuf,
    #[arg(long, help = "Only scan the top level of PATH")]
    pub no_recurse: bool,
    #[arg(long, value_delimiter = ',', help = "Only consider these extensions, e.g. mp3,flac")]
    pub ext: Vec<String>,
    #[arg(long, value_enum, help = "Add a preset extension list")]
    pub media: Vec<CliMediaKind>,
    #[arg(long, help = "Print the report as JSON")]
    pub json: bool,
    #[arg(long, env = "PLATYPUS_PUMP_MS", default_value_t = platypus_config::DEFAULT_PUMP_INTERVAL_MS)]
    pub pump_ms: u64,
}

impl DupesArgs {
    pub fn scan_options(&self) -> ScanOptions {
        let mut options = ScanOptions::new(self.path.clone());
        options.recursive = !self.no_recurse;
        for kind in &self.media {
            options = options.with_media((*kind).into());
        }
        for ext in &self.ext {
            options = options.with_extension(ext);
        }
        options
    }
}
