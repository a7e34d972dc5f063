//! Main entry point for the vbadump CLI application.
//!
//! Lists or extracts the macro modules of an unpacked VBA storage. Parsing
//! and decompression are blocking, so each module runs on the blocking pool
//! with its own stream handle while output is written asynchronously.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use vbaextract::{Cli, ModuleEntry, ProjectDescriptor, VbaExtractor};

/// Application entry point.
///
/// Parses the command line, sets up logging, reads the project metadata and
/// then either lists or extracts the modules.
///
/// # Returns
///
/// Returns `Ok(())` on success, or an error if the project cannot be read
/// or any selected module fails to extract.
#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();
    init_tracing(&cli)?;

    // Parse the project stream on the blocking pool
    let extractor = Arc::new(VbaExtractor::with_options(cli.extract_options()));
    let project = {
        let extractor = extractor.clone();
        let dir = PathBuf::from(&cli.dir);
        tokio::task::spawn_blocking(move || extractor.read_project(&dir)).await?
    }
    .with_context(|| format!("cannot read VBA project in {}", cli.dir))?;

    // List mode: display project contents and exit
    if cli.list || cli.verbose {
        list_modules(&project, cli.verbose);
        return Ok(());
    }

    extract_modules(extractor, Arc::new(project), &cli).await
}

/// Log to stderr. `RUST_LOG` overrides the level chosen from `-q`.
///
/// # Arguments
///
/// * `cli` - Parsed command-line arguments, used for the default filter
///
/// # Returns
///
/// Returns an error if a global subscriber was already installed.
fn init_tracing(cli: &Cli) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}

/// Print the module table.
///
/// The verbose format adds the project version, the header fields and the
/// offset of each module's compressed source.
///
/// # Arguments
///
/// * `project` - The parsed project descriptor
/// * `verbose` - If true, print the header block and an offset column
fn list_modules(project: &ProjectDescriptor, verbose: bool) {
    if verbose {
        // Project summary before the module table
        let header = &project.header;
        println!("Project:  {}", project.version);
        println!(
            "Platform: {}",
            if project.version.is_mac() { "Mac" } else { "Windows" }
        );
        println!(
            "LIDs:     {:#06x} {:#06x}  charset {}",
            header.lid_a, header.lid_b, header.charset
        );
        println!(
            "Refs:     {} records, {} expected{}",
            project.references.records,
            project.references.expected_records,
            if project.references.pending_pair { ", unpaired control" } else { "" }
        );
        println!();
        println!("{:>10}  Name", "Offset");
        println!("{}", "-".repeat(40));
    }

    for module in project {
        let name = module.name().unwrap_or("<unnamed>");
        if verbose {
            println!("{:>#10x}  {}", module.offset, name);
        } else {
            println!("{}", name);
        }
    }

    // Print summary line in verbose mode
    if verbose {
        println!("{}", "-".repeat(40));
        println!("{:>10}  {} modules", "", project.len());
    }
}

/// Decompress the selected modules and write them out in table order.
///
/// Each module is decompressed on the blocking pool with its own stream
/// handle; results are awaited in table order so output never interleaves.
/// A module that fails is logged and counted, the remaining modules are
/// still written.
///
/// # Arguments
///
/// * `extractor` - Shared extractor carrying the decompression options
/// * `project` - The parsed project descriptor
/// * `cli` - Parsed command-line arguments (filters, output mode, overwrite flags)
///
/// # Returns
///
/// Returns `Ok(())` when every selected module was written or skipped, or an
/// error naming how many modules could not be extracted.
async fn extract_modules(
    extractor: Arc<VbaExtractor>,
    project: Arc<ProjectDescriptor>,
    cli: &Cli,
) -> Result<()> {
    // Apply the positional and -x filters; unnamed modules cannot be opened
    let selected: Vec<ModuleEntry> = project
        .iter()
        .filter(|m| match m.name() {
            Some(name) => cli.selects(name),
            None => {
                warn!(index = m.index, "skipping module without a decodable name");
                false
            }
        })
        .cloned()
        .collect();

    let total = selected.len();
    let show_names = cli.pipe && total > 1;

    // Output names are fixed before any work starts so collisions resolve
    // the same way regardless of completion order
    let mut used = HashSet::new();
    let file_names: Vec<String> = selected
        .iter()
        .map(|m| output_file_name(m.name().unwrap_or_default(), m.index, &mut used))
        .collect();

    let handles: Vec<_> = selected
        .into_iter()
        .map(|entry| {
            let extractor = extractor.clone();
            let project = project.clone();
            tokio::task::spawn_blocking(move || {
                let source = extractor.extract_to_memory(&project, &entry);
                (entry, source)
            })
        })
        .collect();

    let mut failures = 0usize;
    for (handle, file_name) in handles.into_iter().zip(&file_names) {
        let (entry, source) = handle.await?;
        let name = entry.name().unwrap_or_default();
        match source {
            Ok(bytes) => write_module(name, file_name, &bytes, cli, show_names).await?,
            Err(e) => {
                failures += 1;
                error!(module = name, error = %e, "extraction failed");
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} modules could not be extracted", failures, total);
    }
    Ok(())
}

/// Write one module's source to stdout or to `<file_name>` in the output directory.
///
/// Existing files are handled like an archive extractor would:
/// - `-n`: never overwrite, skip the module
/// - `-o`: overwrite without prompting
/// - neither: skip and suggest `-o`
///
/// # Arguments
///
/// * `name` - Module name as stored in the project, used for messages
/// * `file_name` - Output file name from [`output_file_name`]
/// * `source` - Decompressed module source
/// * `cli` - Parsed command-line arguments
/// * `show_name` - Print a `--- name ---` marker before piped source
///
/// # Returns
///
/// Returns `Ok(())` if the source was written or the file was skipped,
/// or an error if the output could not be created or written.
async fn write_module(
    name: &str,
    file_name: &str,
    source: &[u8],
    cli: &Cli,
    show_name: bool,
) -> Result<()> {
    // Pipe mode: write straight to stdout
    if cli.pipe {
        let mut stdout = tokio::io::stdout();
        if show_name {
            stdout
                .write_all(format!("--- {} ---\n", name).as_bytes())
                .await?;
        }
        stdout.write_all(source).await?;
        stdout.flush().await?;
        return Ok(());
    }

    let dir = PathBuf::from(cli.extract_dir.as_deref().unwrap_or("."));
    fs::create_dir_all(&dir).await?;
    let output_path = dir.join(file_name);

    // Handle existing files based on overwrite options
    if fs::try_exists(&output_path).await? {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", output_path.display());
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", output_path.display());
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", output_path.display());
    }

    let mut file = fs::File::create(&output_path)
        .await
        .with_context(|| format!("cannot create {}", output_path.display()))?;
    file.write_all(source).await?;
    file.flush().await?;

    Ok(())
}

/// Pick the output file name for a module, unique within this run.
///
/// The name is `<sanitized>.vba`. When two module names sanitize to the same
/// file (`Mod 1` and `Mod_1`), the later one gets its table index appended,
/// e.g. `Mod_1.1.vba`. Names are compared case-insensitively since the output
/// directory may live on a case-insensitive filesystem.
///
/// # Arguments
///
/// * `name` - Module name as stored in the project
/// * `index` - The module's position in the module table
/// * `used` - Lowercased file names already handed out in this run
fn output_file_name(name: &str, index: usize, used: &mut HashSet<String>) -> String {
    let base = sanitize_file_name(name);
    let mut candidate = format!("{}.vba", base);
    let mut attempt = 0usize;
    while !used.insert(candidate.to_ascii_lowercase()) {
        candidate = if attempt == 0 {
            format!("{}.{}.vba", base, index)
        } else {
            format!("{}.{}.{}.vba", base, index, attempt)
        };
        attempt += 1;
    }
    candidate
}

/// Turn a module name into a file name that stays inside the output directory.
fn sanitize_file_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            // Keep a conservative portable set, everything else becomes '_'
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    // No hidden files and no "." / ".." components
    if out.is_empty() || out.starts_with('.') {
        out.insert(0, '_');
    }
    out
}
