//! nrbf - Inspect .NET BinaryFormatter payloads without deserializing them
//!
//! This tool decodes NRBF payloads into their record graph and prints it as
//! a tree, as statistics or as a one-line summary per payload.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use nrbf_core::report::{collect_stats, write_tree, ReportConfig};
use nrbf_core::{decode, starts_with_payload_header, stream_starts_with_payload_header};
use nrbf_core::{DecodeOptions, Payload, SerializationRecord};
use std::collections::HashMap;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Inspect .NET BinaryFormatter payloads without deserializing them
#[derive(Parser, Debug)]
#[command(name = "nrbf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "tree")]
    format: OutputFormat,

    /// Only check whether inputs start with a payload header
    #[arg(long)]
    check: bool,

    /// Maximum nesting depth of type names
    #[arg(long, default_value = "16")]
    max_type_depth: usize,

    /// List library declarations in tree output
    #[arg(long)]
    show_libraries: bool,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single payload file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of payloads to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format for decoded payloads
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Indented record tree
    Tree,
    /// Record counts per kind
    Stats,
    /// One line per payload (for scripting)
    Summary,
}

/// Tracks seen payloads for deduplication
#[derive(Default)]
struct PayloadRegistry {
    /// Maps fingerprint -> first path it was seen at
    seen: HashMap<String, PathBuf>,
    /// Statistics
    stats: RegistryStats,
}

#[derive(Default)]
struct RegistryStats {
    total_found: usize,
    duplicates_skipped: usize,
    decoded: usize,
    failed: usize,
}

impl PayloadRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Compute a short fingerprint of the payload (first 8 chars of blake3)
    fn fingerprint(data: &[u8]) -> String {
        let hash = blake3::hash(data);
        hash.to_hex()[..8].to_string()
    }

    /// Register a payload; returns false if identical bytes were already seen
    fn register(&mut self, fingerprint: &str, path: &Path) -> bool {
        self.stats.total_found += 1;

        if let Some(first) = self.seen.get(fingerprint) {
            debug!(
                "Skipping duplicate: {} (same as {}, fingerprint: {})",
                path.display(),
                first.display(),
                fingerprint
            );
            self.stats.duplicates_skipped += 1;
            return false;
        }

        self.seen.insert(fingerprint.to_string(), path.to_path_buf());
        true
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} found, {} duplicates skipped, {} decoded, {} failed",
            self.stats.total_found,
            self.stats.duplicates_skipped,
            self.stats.decoded,
            self.stats.failed
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    // Dispatch based on input mode
    if let Some(ref file) = cli.input.file {
        process_single_file(&cli, file)
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory)
    } else {
        bail!("Either --file or --directory must be specified")
    }
}

/// Process a single payload file
fn process_single_file(cli: &Cli, file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let mut registry = PayloadRegistry::new();
    process_payload(cli, file, &mut registry)?;

    if !cli.check {
        registry.print_summary();
    }

    Ok(())
}

/// Process a directory of payloads recursively
fn process_directory(cli: &Cli, directory: &Path) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut registry = PayloadRegistry::new();
    let mut files_processed = 0;

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        // Skip hidden files
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
        {
            continue;
        }

        if !cli.check && !is_likely_payload(path) {
            trace!("Skipping non-payload: {}", path.display());
            continue;
        }

        debug!("Processing payload: {}", path.display());
        if let Err(e) = process_payload(cli, path, &mut registry) {
            // Log error but continue with other files
            warn!("Error processing {}: {:#}", path.display(), e);
            registry.stats.failed += 1;
        }
        files_processed += 1;
    }

    info!("Processed {} files", files_processed);

    if !cli.check {
        registry.print_summary();
    }

    Ok(())
}

/// Sniff the first bytes of a file for a payload header
fn is_likely_payload(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    stream_starts_with_payload_header(&mut file).unwrap_or(false)
}

/// Decode one payload and print it in the requested format
fn process_payload(cli: &Cli, path: &Path, registry: &mut PayloadRegistry) -> Result<()> {
    trace!("Reading {}", path.display());
    let data =
        fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;

    if cli.check {
        let verdict = if starts_with_payload_header(&data) {
            "payload"
        } else {
            "not a payload"
        };
        println!("{}: {}", path.display(), verdict);
        return Ok(());
    }

    let fingerprint = PayloadRegistry::fingerprint(&data);
    if !registry.register(&fingerprint, path) {
        return Ok(());
    }

    let options = DecodeOptions::new().max_type_name_depth(cli.max_type_depth);
    let payload = decode(data.as_slice(), &options)
        .with_context(|| format!("Failed to decode payload: {}", path.display()))?;
    registry.stats.decoded += 1;

    debug!(
        "Decoded {} ({} records, max stack depth {})",
        path.display(),
        payload.stats().records,
        payload.stats().max_stack_depth
    );

    match cli.format {
        OutputFormat::Tree => {
            let config = ReportConfig::new().show_libraries(cli.show_libraries);
            let mut output = String::new();
            writeln!(output, "# {} [{}]", path.display(), fingerprint)?;
            write_tree(&payload, &mut output, &config)?;
            print!("{output}");
        }
        OutputFormat::Stats => print!("{}", format_stats(path, &payload)),
        OutputFormat::Summary => println!("{}", summary_line(path, &fingerprint, &payload)),
    }

    Ok(())
}

/// Kind and type of the root record
fn describe_root(record: &SerializationRecord) -> String {
    match record.type_name() {
        Some(name) => format!("{} {}", record.kind_name(), name.full_name()),
        None => record.kind_name().to_string(),
    }
}

fn summary_line(path: &Path, fingerprint: &str, payload: &Payload) -> String {
    format!(
        "{}\t{}\t{}\t{} records",
        path.display(),
        fingerprint,
        describe_root(payload.root()),
        payload.records().len()
    )
}

fn format_stats(path: &Path, payload: &Payload) -> String {
    let graph = collect_stats(payload);
    let decode = payload.stats();
    format!(
        "{}\n  libraries: {}\n  classes: {}\n  arrays: {}\n  strings: {}\n  boxed primitives: {}\n  \
         primitive values: {}\n  nulls: {}\n  back references: {}\n  graph depth: {}\n  \
         records read: {}\n  max stack depth: {}\n",
        path.display(),
        graph.library_count,
        graph.class_count,
        graph.array_count,
        graph.string_count,
        graph.boxed_count,
        graph.primitive_count,
        graph.null_count,
        graph.back_reference_count,
        graph.max_depth,
        decode.records,
        decode.max_stack_depth
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Header, a string root and the end record
    fn string_payload(value: &str) -> Vec<u8> {
        let mut data = vec![0, 1, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 1, 0, 0, 0, 0, 0, 0, 0];
        data.extend_from_slice(&[6, 1, 0, 0, 0, value.len() as u8]);
        data.extend_from_slice(value.as_bytes());
        data.push(11);
        data
    }

    #[test]
    fn test_payload_registry_deduplication() {
        let mut registry = PayloadRegistry::new();
        let fingerprint = PayloadRegistry::fingerprint(&string_payload("a"));

        assert!(registry.register(&fingerprint, Path::new("one.bin")));
        assert!(!registry.register(&fingerprint, Path::new("two.bin")));

        let other = PayloadRegistry::fingerprint(&string_payload("b"));
        assert!(registry.register(&other, Path::new("three.bin")));

        assert_eq!(registry.stats.total_found, 3);
        assert_eq!(registry.stats.duplicates_skipped, 1);
    }

    #[test]
    fn test_fingerprint() {
        let hash1 = PayloadRegistry::fingerprint(b"hello");
        let hash2 = PayloadRegistry::fingerprint(b"hello");
        let hash3 = PayloadRegistry::fingerprint(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 8);
    }

    #[test]
    fn test_is_likely_payload() {
        let temp_dir = TempDir::new().unwrap();
        let payload = temp_dir.path().join("session.bin");
        let text = temp_dir.path().join("notes.txt");
        fs::write(&payload, string_payload("hi")).unwrap();
        fs::write(&text, "not a payload at all").unwrap();

        assert!(is_likely_payload(&payload));
        assert!(!is_likely_payload(&text));
        assert!(!is_likely_payload(&temp_dir.path().join("missing.bin")));
    }

    #[test]
    fn test_summary_line() {
        let payload = decode(string_payload("hi").as_slice(), &DecodeOptions::default()).unwrap();
        let fingerprint = PayloadRegistry::fingerprint(&string_payload("hi"));
        assert_eq!(
            summary_line(Path::new("a.bin"), &fingerprint, &payload),
            format!("a.bin\t{fingerprint}\tstring\t1 records")
        );
    }

    #[test]
    fn test_format_stats() {
        let payload = decode(string_payload("hi").as_slice(), &DecodeOptions::default()).unwrap();
        let stats = format_stats(Path::new("a.bin"), &payload);
        assert!(stats.starts_with("a.bin\n"));
        assert!(stats.contains("  strings: 1\n"));
        assert!(stats.contains("  records read: 3\n"));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
