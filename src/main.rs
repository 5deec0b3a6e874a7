use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use srskit::error::{Error, Result};
use srskit::mkv;
use srskit::resolver::{normalize_relative_name, SourceHandle, SourceResolver, StoredFileSink};
use srskit::sfv;
use srskit::srr::{self, BlockKind, SrrBlock};
use srskit::srs;

type CliResult = std::result::Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "srskit", about = "Reconstruct scene-release RAR volumes and video samples")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Operate on a `.srr` archive metadata container.
    Srr {
        #[command(subcommand)]
        action: SrrAction,
    },
    /// Operate on a `.srs` sample metadata container.
    Srs {
        #[command(subcommand)]
        action: SrsAction,
    },
}

#[derive(Subcommand)]
enum SrrAction {
    /// Print every parsed block.
    Info { path: PathBuf },
    /// Extract embedded stored files (NFO, SFV, proofs, SRS samples).
    Extract {
        path: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Reconstruct every RAR volume named in the SRR.
    Rebuild {
        path: PathBuf,
        #[arg(long)]
        source_dir: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Validate each reconstructed volume against the SRR's embedded SFV.
        #[arg(long)]
        verify_sfv: bool,
        /// Skip SFV validation even if `--verify-sfv` is also given.
        #[arg(long)]
        skip_validation: bool,
        /// Don't delete the source files consumed during reconstruction.
        #[arg(long)]
        keep_sources: bool,
        /// Don't delete the `.srr` itself once reconstruction succeeds.
        #[arg(long)]
        keep_srr: bool,
    },
}

#[derive(Subcommand)]
enum SrsAction {
    /// Print the FileData/TrackData records.
    Info { path: PathBuf },
    /// Extract the matching source bytes and rebuild the sample file.
    Rebuild {
        path: PathBuf,
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> CliResult {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Srr { action } => run_srr(action),
        Command::Srs { action } => run_srs(action),
    }
}

fn run_srr(action: SrrAction) -> CliResult {
    match action {
        SrrAction::Info { path } => {
            for block in open_srr_iterator(&path)? {
                let block = block?;
                println!("{block:#?}");
            }
        }
        SrrAction::Extract { path, out } => {
            fs::create_dir_all(&out)?;
            let mut sink = FsStoredFileSink { root: out };
            let mut payload_reader = BufReader::new(File::open(&path)?);

            for block in open_srr_iterator(&path)? {
                let block = block?;
                if let BlockKind::StoredFile(stored) = &block.kind {
                    let payload_offset = block.position + block.head_size as u64;
                    payload_reader.seek(SeekFrom::Start(payload_offset))?;
                    let mut bytes = vec![0u8; stored.file_size as usize];
                    payload_reader.read_exact(&mut bytes)?;
                    tracing::info!(name = %stored.file_name, len = stored.file_size, "extracted stored file");
                    sink.store(&normalize_relative_name(&stored.file_name), &bytes)?;
                }
            }
        }
        SrrAction::Rebuild {
            path,
            source_dir,
            out,
            verify_sfv,
            skip_validation,
            keep_sources,
            keep_srr,
        } => {
            let blocks: Vec<SrrBlock> = open_srr_iterator(&path)?.collect::<Result<_>>()?;
            let mut resolver = FsSourceResolver { root: source_dir.clone(), resolved: Vec::new() };

            let written = srr::reconstruct_volumes(blocks, &mut resolver, &out)?;
            for (name, path) in &written {
                tracing::info!(volume = %name, path = %path.display(), "reconstructed volume");
            }

            if verify_sfv && !skip_validation {
                if let Some(entries) = find_sfv_entries(&path)? {
                    for (name, path) in &written {
                        if let Some(entry) = sfv::parser::find_entry(&entries, name) {
                            let ok = sfv::verify_crc(path, entry.expected_crc32)?;
                            if !ok {
                                return Err(Error::CrcMismatch {
                                    name: name.clone(),
                                    expected: entry.expected_crc32,
                                    found: sfv::crc::crc32_of(&mut File::open(path)?)?,
                                }
                                .into());
                            }
                            tracing::info!(volume = %name, "crc verified");
                        }
                    }
                }
            }

            // Policy lives entirely in the CLI (core never touches a path it
            // wasn't explicitly handed a reader/writer for): once every
            // volume is written and validated, the caller decides whether
            // the inputs that fed reconstruction are still needed.
            if !keep_sources {
                for source_path in &resolver.resolved {
                    match fs::remove_file(source_path) {
                        Ok(()) => tracing::info!(path = %source_path.display(), "removed source file"),
                        Err(err) => tracing::warn!(path = %source_path.display(), error = %err, "failed to remove source file"),
                    }
                }
            }

            if !keep_srr {
                match fs::remove_file(&path) {
                    Ok(()) => tracing::info!(path = %path.display(), "removed srr"),
                    Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to remove srr"),
                }
            }
        }
    }
    Ok(())
}

fn run_srs(action: SrsAction) -> CliResult {
    match action {
        SrsAction::Info { path } => {
            let mut reader = BufReader::new(File::open(&path)?);
            let (file_data, tracks) = srs::metadata::parse(&mut reader)?;
            println!("{file_data:#?}");
            for track in &tracks {
                println!("{track:#?}");
            }
        }
        SrsAction::Rebuild { path, source, out } => {
            let mut srs_reader = BufReader::new(File::open(&path)?);
            let (file_data, tracks) = srs::metadata::parse(&mut srs_reader)?;

            let mut source_reader = BufReader::new(File::open(&source)?);
            let per_track = mkv::extractor::extract_mkv_tracks(&mut source_reader, &tracks)?;

            srs_reader.seek(SeekFrom::Start(0))?;
            let mut output = BufWriter::new(File::create(&out)?);
            let (written, crc) = srs::rebuilder::rebuild_sample(&mut srs_reader, &per_track, &mut output)?;
            output.flush()?;

            tracing::info!(written, crc = format!("{crc:08X}"), "sample rebuilt");
            if written != file_data.original_size {
                tracing::warn!(written, expected = file_data.original_size, "size mismatch against FileData");
            }
            if crc != file_data.crc32 {
                return Err(Error::CrcMismatch {
                    name: file_data.sample_name.clone(),
                    expected: file_data.crc32,
                    found: crc,
                }
                .into());
            }
        }
    }
    Ok(())
}

fn open_srr_iterator(path: &Path) -> Result<srr::BlockIterator<BufReader<File>>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    Ok(srr::BlockIterator::new(BufReader::new(file), 0, len))
}

fn find_sfv_entries(srr_path: &Path) -> Result<Option<Vec<sfv::SfvEntry>>> {
    let mut payload_reader = BufReader::new(File::open(srr_path)?);
    for block in open_srr_iterator(srr_path)? {
        let block = block?;
        if let BlockKind::StoredFile(stored) = &block.kind {
            if stored.file_name.to_lowercase().ends_with(".sfv") {
                let payload_offset = block.position + block.head_size as u64;
                payload_reader.seek(SeekFrom::Start(payload_offset))?;
                let mut bytes = vec![0u8; stored.file_size as usize];
                payload_reader.read_exact(&mut bytes)?;
                let text = String::from_utf8_lossy(&bytes);
                return Ok(Some(sfv::parse_sfv(&text)));
            }
        }
    }
    Ok(None)
}

struct FsSourceResolver {
    root: PathBuf,
    /// Every path actually opened, so `--keep-sources` can tell the caller
    /// which files it's entitled to delete once reconstruction succeeds.
    resolved: Vec<PathBuf>,
}

impl SourceResolver for FsSourceResolver {
    fn resolve(&mut self, logical_name: &str) -> Result<SourceHandle> {
        let path = self.root.join(normalize_relative_name(logical_name));
        let file = File::open(&path).map_err(|_| Error::MissingSource { name: logical_name.to_string() })?;
        self.resolved.push(path);
        Ok(SourceHandle::new(Box::new(BufReader::new(file)))?)
    }
}

struct FsStoredFileSink {
    root: PathBuf,
}

impl StoredFileSink for FsStoredFileSink {
    fn store(&mut self, normalized_name: &str, bytes: &[u8]) -> std::io::Result<()> {
        let path = self.root.join(normalized_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(bytes)
    }
}
