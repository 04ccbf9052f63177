use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use oxfs::{
    format_volume, open_volume, FileType, FormatOptions, FsError, RecordKind, StoreType, Volume,
    FORMAT_VERSION,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new image
    Format {
        /// Offset width: 16, 32 or 64
        bits: u32,

        /// Volume size, e.g. 65535, 64k, 1m
        #[arg(value_parser = parse_size)]
        size: u64,

        image: PathBuf,

        /// Skip the root directory
        #[arg(long)]
        flat: bool,

        /// Seed the id generator from the OS instead of the fixed default
        #[arg(long)]
        random_seed: bool,
    },

    /// List a directory
    Ls {
        image: PathBuf,
        #[arg(default_value = "/")]
        path: String,
    },

    /// Show inode information
    Stat {
        image: PathBuf,
        path: Option<String>,
        #[arg(long, conflicts_with = "path")]
        inode: Option<u64>,
    },

    /// Print a file to stdout
    Read {
        image: PathBuf,
        path: Option<String>,
        #[arg(long, conflicts_with = "path")]
        inode: Option<u64>,
    },

    /// Store a file from disk (or stdin with `-`)
    Write {
        image: PathBuf,
        path: String,
        input: PathBuf,

        /// Expand the image and retry when it is full
        #[arg(long)]
        grow: bool,
    },

    /// Create a directory
    Mkdir { image: PathBuf, path: String },

    /// Remove a file or directory
    Rm {
        image: PathBuf,
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },

    /// Move or rename an entry
    Mv {
        image: PathBuf,
        src: String,
        dest: String,
    },

    /// Slide all records to the front of the image
    Compact { image: PathBuf },

    /// Change the usable size of the image
    Resize {
        image: PathBuf,
        #[arg(value_parser = parse_size)]
        size: u64,
    },

    /// Print every record with its byte range
    Walk { image: PathBuf },

    /// Delete every directory inode
    StripDirs { image: PathBuf },

    /// Copy an image into a freshly formatted one
    Convert {
        image: PathBuf,
        output: PathBuf,

        /// Offset width of the new image
        #[arg(long, default_value_t = 64)]
        bits: u32,

        /// Size of the new image; defaults to the source size
        #[arg(long, value_parser = parse_size)]
        size: Option<u64>,
    },

    /// Check the structure of an image
    Check { image: PathBuf },

    /// Print tool and format versions
    Version,
}

fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, shift) = match s.chars().last().map(|c| c.to_ascii_lowercase()) {
        Some('k') => (&s[..s.len() - 1], 10),
        Some('m') => (&s[..s.len() - 1], 20),
        Some('g') => (&s[..s.len() - 1], 30),
        _ => (s, 0),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size: {}", s))?;
    value
        .checked_mul(1 << shift)
        .ok_or_else(|| format!("size out of range: {}", s))
}

fn store_type(bits: u32) -> Result<StoreType> {
    StoreType::from_bits(bits).ok_or_else(|| anyhow!("unsupported offset width: {} (use 16, 32 or 64)", bits))
}

fn load(image: &Path) -> Result<Box<dyn Volume>> {
    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    debug!("Loaded {} ({} bytes)", image.display(), bytes.len());
    open_volume(bytes).with_context(|| format!("opening {}", image.display()))
}

fn save(image: &Path, volume: &dyn Volume) -> Result<()> {
    std::fs::write(image, volume.as_bytes())
        .with_context(|| format!("writing {}", image.display()))?;
    info!("Saved {} ({} bytes)", image.display(), volume.as_bytes().len());
    Ok(())
}

fn type_name(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Directory => "dir",
        FileType::Normal => "file",
        FileType::None => "none",
    }
}

/// Writes `data` to `path`, expanding the volume after each `OutOfSpace`
/// until the write fits or the width's maximum is reached.
fn write_growing(volume: &mut dyn Volume, path: &str, data: &[u8]) -> Result<u64> {
    loop {
        match volume.write(path, data, FileType::Normal) {
            Err(FsError::OutOfSpace { needed, available }) => {
                let max = volume.store_type().max_size();
                let target = volume
                    .size()
                    .saturating_add(needed - available.min(needed))
                    .saturating_add(volume.size() / 2)
                    .min(max);
                if target <= volume.size() {
                    bail!(FsError::OutOfSpace { needed, available });
                }
                info!("Expanding volume from {} to {} bytes", volume.size(), target);
                volume.expand(target)?;
            }
            Err(err) => return Err(err.into()),
            Ok(id) => return Ok(id),
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Format {
            bits,
            size,
            image,
            flat,
            random_seed,
        } => {
            let store_type = store_type(bits)?;
            let mut options = FormatOptions {
                directories: !flat,
                ..FormatOptions::default()
            };
            if random_seed {
                options.seed = [rand::random(), rand::random()];
            }
            let len = usize::try_from(size).context("size does not fit in memory")?;
            let volume = format_volume(vec![0u8; len], size, store_type, options)?;
            save(&image, volume.as_ref())?;
            println!(
                "Formatted {} as a {}-bit volume of {} bytes",
                image.display(),
                bits,
                size
            );
        }
        Commands::Ls { image, path } => {
            let volume = load(&image)?;
            for entry in volume.ls(&path)? {
                println!(
                    "{:<4} {:>20} {:>10} {:>3} {}",
                    type_name(entry.stat.file_type),
                    entry.stat.inode,
                    entry.stat.size,
                    entry.stat.links,
                    entry.name
                );
            }
        }
        Commands::Stat { image, path, inode } => {
            let volume = load(&image)?;
            let stat = match (inode, path) {
                (Some(id), _) => volume.stat_inode(id)?,
                (None, Some(path)) => volume.stat(&path)?,
                (None, None) => bail!("give a path or --inode"),
            };
            println!("inode: {}", stat.inode);
            println!("type:  {}", type_name(stat.file_type));
            println!("size:  {}", stat.size);
            println!("links: {}", stat.links);
        }
        Commands::Read { image, path, inode } => {
            let volume = load(&image)?;
            let data = match (inode, path) {
                (Some(id), _) => volume.read_inode(id)?,
                (None, Some(path)) => volume.read(&path)?,
                (None, None) => bail!("give a path or --inode"),
            };
            std::io::stdout().write_all(&data)?;
        }
        Commands::Write {
            image,
            path,
            input,
            grow,
        } => {
            let data = if input.as_os_str() == "-" {
                let mut buf = Vec::new();
                std::io::stdin().read_to_end(&mut buf)?;
                buf
            } else {
                std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?
            };
            let mut volume = load(&image)?;
            let id = if grow {
                write_growing(volume.as_mut(), &path, &data)?
            } else {
                volume.write(&path, &data, FileType::Normal)?
            };
            save(&image, volume.as_ref())?;
            println!("Wrote {} bytes to {} (inode {})", data.len(), path, id);
        }
        Commands::Mkdir { image, path } => {
            let mut volume = load(&image)?;
            let id = volume.mkdir(&path)?;
            save(&image, volume.as_ref())?;
            println!("Created {} (inode {})", path, id);
        }
        Commands::Rm {
            image,
            path,
            recursive,
        } => {
            let mut volume = load(&image)?;
            volume.remove(&path, recursive)?;
            save(&image, volume.as_ref())?;
        }
        Commands::Mv { image, src, dest } => {
            let mut volume = load(&image)?;
            volume.rename(&src, &dest)?;
            save(&image, volume.as_ref())?;
        }
        Commands::Compact { image } => {
            let mut volume = load(&image)?;
            volume.compact()?;
            save(&image, volume.as_ref())?;
            println!("{} of {} bytes in use", volume.mem_used(), volume.size());
        }
        Commands::Resize { image, size } => {
            let mut volume = load(&image)?;
            if size > volume.as_bytes().len() as u64 {
                volume.expand(size)?;
            } else {
                volume.resize(size)?;
            }
            save(&image, volume.as_ref())?;
            println!("Volume size is now {} bytes", volume.size());
        }
        Commands::Walk { image } => {
            let volume = load(&image)?;
            volume.walk(&mut |record| {
                let kind = match record.kind {
                    RecordKind::Header => "header".to_string(),
                    RecordKind::Sentinel => "sentinel".to_string(),
                    RecordKind::Inode { id, file_type } => format!("inode {} (type {})", id, file_type),
                };
                println!("{:>10} {:>10}  {}", record.start, record.end, kind);
                Ok(())
            })?;
        }
        Commands::StripDirs { image } => {
            let mut volume = load(&image)?;
            let removed = volume.strip_directories()?;
            save(&image, volume.as_ref())?;
            println!("Removed {} directories", removed);
        }
        Commands::Convert {
            image,
            output,
            bits,
            size,
        } => {
            let source = load(&image)?;
            let size = size.unwrap_or_else(|| source.size());
            let len = usize::try_from(size).context("size does not fit in memory")?;
            let mut dest = format_volume(vec![0u8; len], size, store_type(bits)?, FormatOptions::default())?;
            source.dump_to(dest.as_mut())?;
            save(&output, dest.as_ref())?;
            println!(
                "Converted {} ({}-bit) into {} ({}-bit)",
                image.display(),
                source.store_type().bits(),
                output.display(),
                bits
            );
        }
        Commands::Check { image } => {
            let volume = load(&image)?;
            volume.verify()?;
            let count = volume.inodes()?.len();
            println!(
                "{}: {}-bit, {} inodes, {} of {} bytes in use",
                image.display(),
                volume.store_type().bits(),
                count,
                volume.mem_used(),
                volume.size()
            );
        }
        Commands::Version => {
            println!("oxfs {} (format version {})", env!("CARGO_PKG_VERSION"), FORMAT_VERSION);
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("oxfs: {:#}", err);
        let code = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<FsError>())
            .map(FsError::code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_accept_binary_suffixes() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("64k"), Ok(65_536));
        assert_eq!(parse_size("1M"), Ok(1 << 20));
        assert_eq!(parse_size("2g"), Ok(2 << 30));
        assert!(parse_size("").is_err());
        assert!(parse_size("12q").is_err());
        assert!(parse_size("99999999999999g").is_err());
    }

    #[test]
    fn widths_map_to_store_types() {
        assert_eq!(store_type(16).unwrap(), StoreType::Fs16);
        assert_eq!(store_type(64).unwrap(), StoreType::Fs64);
        assert!(store_type(8).is_err());
    }

    #[test]
    fn grow_retries_until_the_write_fits() {
        let mut volume =
            format_volume(vec![0u8; 512], 512, StoreType::Fs32, FormatOptions::default()).unwrap();
        let data = vec![1u8; 5000];
        write_growing(volume.as_mut(), "/big", &data).unwrap();
        assert_eq!(volume.read("/big").unwrap(), data);
        volume.verify().unwrap();
    }

    #[test]
    fn grow_stops_at_the_width_limit() {
        let mut volume =
            format_volume(vec![0u8; 1024], 1024, StoreType::Fs16, FormatOptions::default()).unwrap();
        let data = vec![1u8; 70_000];
        assert!(write_growing(volume.as_mut(), "/big", &data).is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["oxfs", "format", "32", "1m", "disk.img"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Format { bits: 32, size: 1_048_576, .. }
        ));
        let cli = Cli::try_parse_from(["oxfs", "rm", "-r", "disk.img", "/usr"]).unwrap();
        assert!(matches!(cli.command, Commands::Rm { recursive: true, .. }));
        assert!(Cli::try_parse_from(["oxfs", "stat", "disk.img", "/a", "--inode", "5"]).is_err());
    }
}
