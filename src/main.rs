//! Main entry point for the rangezip CLI application.
//!
//! Lists and extracts ZIP archives from the local filesystem or from HTTP
//! servers that honor Range requests.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use rangezip::zip::{ROOT, normalize};
use rangezip::{
    Cli, FileHeader, HttpRangeSource, LocalFileSource, RangeRead, RangeSource, ZipArchive,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.is_http_url() {
        let source = Arc::new(HttpRangeSource::new(cli.file.clone()).await?);
        let transferred_before = source.transferred_bytes();

        process_zip(source.clone(), &cli).await?;

        // Display network transfer statistics for HTTP sources
        if !cli.is_quiet() {
            let transferred = source.transferred_bytes() - transferred_before;
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        let source = LocalFileSource::new(Path::new(&cli.file))
            .await
            .with_context(|| format!("cannot open {}", cli.file))?;
        process_zip(Arc::new(source), &cli).await?;
    }

    Ok(())
}

/// List mode (`-l` or `-v`) prints the directory; otherwise every entry
/// passing the name filters is extracted.
async fn process_zip(source: Arc<dyn RangeSource>, cli: &Cli) -> Result<()> {
    let archive = ZipArchive::with_options(source, cli.archive_options())
        .await
        .with_context(|| format!("cannot read archive {}", cli.file))?;

    if cli.list || cli.verbose {
        list_files(&archive, cli.verbose);
        return Ok(());
    }

    let files_to_extract: Vec<(&FileHeader, String)> = archive
        .files()
        .iter()
        .filter(|h| !h.is_dir())
        .map(|h| (h, normalize(&h.name())))
        .filter(|(_, path)| path != ROOT && selected(cli, path))
        .collect();

    let multiple_files = cli.pipe && files_to_extract.len() > 1;
    for (header, path) in files_to_extract {
        extract_file(&archive, header, &path, cli, multiple_files)
            .await
            .with_context(|| format!("failed to extract {path}"))?;
    }

    Ok(())
}

/// Apply the positional file arguments and the `-x` exclusions.
fn selected(cli: &Cli, path: &str) -> bool {
    if !cli.files.is_empty() {
        let matches = cli.files.iter().any(|f| {
            if has_glob_chars(f) {
                glob_match(f, path)
            } else {
                path == f || base_name(path) == f
            }
        });
        if !matches {
            return false;
        }
    }

    !cli
        .exclude
        .iter()
        .any(|x| path.contains(x.as_str()) || glob_match(x, path))
}

fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// List files in the archive.
///
/// `-l` prints one name per line; `-v` prints a table with sizes,
/// compression ratio and modification time. A `*` after the time marks a
/// timestamp taken from a high-precision extra field.
fn list_files(archive: &ZipArchive, verbose: bool) {
    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>6}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(72));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for header in archive.files() {
        if !verbose {
            println!("{}", header.name());
            continue;
        }

        let marker = if header.has_precise_modified() { "*" } else { " " };
        println!(
            "{:>10}  {:>10}  {}  {}{}  {}",
            header.uncompressed_size,
            header.compressed_size,
            ratio(header.compressed_size, header.uncompressed_size),
            header.modified.format("%Y-%m-%d  %H:%M"),
            marker,
            header.name()
        );

        if !header.is_dir() {
            total_uncompressed += header.uncompressed_size;
            total_compressed += header.compressed_size;
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(72));
        println!(
            "{:>10}  {:>10}  {}  {:>19}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
        if !archive.comment().is_empty() {
            println!("\n{}", archive.comment());
        }
    }
}

/// Percentage saved by compression.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Extract a single file from the archive.
///
/// `path` is the normalized entry name, so nothing is written outside the
/// output directory.
async fn extract_file(
    archive: &ZipArchive,
    header: &FileHeader,
    path: &str,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    if cli.pipe {
        let mut stdout = tokio::io::stdout();
        if show_filename {
            stdout
                .write_all(format!("--- {path} ---\n").as_bytes())
                .await?;
        }
        if cli.gzip {
            let mut reader = archive.open_entry_as_gzip(header).await?;
            copy_and_close(&mut reader, &mut stdout).await?;
        } else {
            let mut reader = archive.open_entry(header).await?;
            copy_and_close(&mut reader, &mut stdout).await?;
        }
        stdout.flush().await?;
        return Ok(());
    }

    let file_name = if cli.junk_paths { base_name(path) } else { path };
    let output_path = match cli.extract_dir {
        Some(ref dir) => PathBuf::from(dir).join(file_name),
        None => PathBuf::from(file_name),
    };

    if tokio::fs::try_exists(&output_path).await? {
        if cli.never_overwrite {
            if !cli.is_very_quiet() {
                eprintln!("Skipping: {path} (file exists)");
            }
            return Ok(());
        }
        if !cli.overwrite {
            if !cli.is_very_quiet() {
                eprintln!("Skipping: {path} (use -o to overwrite)");
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {path}");
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut reader = archive.open_entry(header).await?;
    let mut file = tokio::fs::File::create(&output_path).await?;
    copy_and_close(&mut reader, &mut file).await?;
    file.flush().await?;

    Ok(())
}

/// Stream `reader` into `writer`, releasing the reader whether or not the
/// copy succeeded. A failed release is reported even when the copy failed.
async fn copy_and_close<W: AsyncWrite + Unpin>(
    reader: &mut dyn RangeRead,
    writer: &mut W,
) -> Result<u64> {
    let copied = tokio::io::copy(&mut *reader, writer).await;
    let closed = reader.close().await;
    match (copied, closed) {
        (Ok(n), Ok(())) => Ok(n),
        (Ok(_), Err(release)) => Err(release).context("Failed to release entry stream"),
        (Err(err), Ok(())) => Err(err.into()),
        (Err(err), Err(release)) => Err(anyhow::Error::new(err)
            .context(format!("releasing entry stream also failed: {release}"))),
    }
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
///
/// # Examples
///
/// ```ignore
/// assert!(glob_match("*.txt", "readme.txt"));
/// assert!(glob_match("file?.dat", "file1.dat"));
/// assert!(!glob_match("*.txt", "readme.md"));
/// ```
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Star matches zero characters, or one and stays for more
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
