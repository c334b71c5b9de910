use clap::Parser;

use crate::zip::ArchiveOptions;

#[derive(Parser, Debug)]
#[command(name = "rangezip")]
#[command(version)]
#[command(about = "List and extract ZIP archives over HTTP Range requests", long_about = None)]
#[command(after_help = "Examples:\n  \
  rangezip data1.zip -x joe        extract all files except joe from data1.zip\n  \
  rangezip -p foo.zip | more       send contents of foo.zip via pipe into more\n  \
  rangezip -l https://example.com/archive.zip   list files from remote ZIP\n  \
  rangezip -p --gzip https://example.com/logs.zip app.log > app.log.gz")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely (sizes, ratio, modification time)
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// With -p, write deflate entries as gzip streams without decompressing
    #[arg(long, requires = "pipe")]
    pub gzip: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Bytes fetched past each entry name to cover its local extra field
    #[arg(long, value_name = "BYTES")]
    pub slack: Option<u64>,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        let options = ArchiveOptions::default();
        match self.slack {
            Some(slack) => options.with_body_slack(slack),
            None => options,
        }
    }
}
