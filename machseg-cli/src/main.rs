use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use machseg_core::header::mach::{VM_PROT_EXECUTE, VM_PROT_READ, VM_PROT_WRITE};
use machseg_core::{
    architectures, ArchInfo, FixedName, MachImage, SectionInfo, SegmentInfo, NAME_LEN,
};
use serde::Serialize;
use std::process::ExitCode;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Mach-O segment lookup CLI
#[derive(Parser)]
#[command(
    name = "machseg",
    about = "Locate segments and sections in Mach-O images",
    version,
    author
)]
struct Cli {
    /// Path to a Mach-O file (thin or universal)
    #[arg(required = true)]
    path: std::path::PathBuf,

    /// Architecture slice to use from a universal binary, e.g. arm64
    #[arg(long, global = true)]
    arch: Option<String>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List architecture slices
    Arches,
    /// List all segments
    Segments,
    /// Show one segment by name
    Segment {
        #[arg(value_parser = record_name)]
        name: String,
    },
    /// Show one section by segment and section name
    Section {
        #[arg(value_parser = record_name)]
        segment: String,
        #[arg(value_parser = record_name)]
        section: String,
    },
}

/// Accepts names that fit a segment or section name field.
fn record_name(name: &str) -> Result<String, String> {
    match FixedName::new(name.as_bytes()) {
        Some(_) => Ok(name.to_string()),
        None => Err(format!("names are at most {NAME_LEN} bytes")),
    }
}

#[derive(Serialize, Tabled)]
struct ArchRow {
    #[tabled(rename = "Arch")]
    name: String,
    #[tabled(rename = "CPU type")]
    cputype: String,
    #[tabled(rename = "Offset")]
    offset: String,
    #[tabled(rename = "Size")]
    size: u64,
    #[tabled(rename = "Bits")]
    bits: u8,
}

impl From<&ArchInfo> for ArchRow {
    fn from(a: &ArchInfo) -> Self {
        Self {
            name: a.name.clone(),
            cputype: format!("{:#x}", a.cputype),
            offset: format!("{:#x}", a.offset),
            size: a.size,
            bits: if a.is_64 { 64 } else { 32 },
        }
    }
}

#[derive(Serialize, Tabled)]
struct SegmentRow {
    #[tabled(rename = "Segment")]
    name: String,
    #[tabled(rename = "VM addr")]
    vmaddr: String,
    #[tabled(rename = "VM size")]
    vmsize: String,
    #[tabled(rename = "File off")]
    fileoff: String,
    #[tabled(rename = "File size")]
    filesize: String,
    #[tabled(rename = "Prot")]
    prot: String,
    #[tabled(rename = "Sections")]
    nsects: usize,
}

impl From<&SegmentInfo> for SegmentRow {
    fn from(s: &SegmentInfo) -> Self {
        Self {
            name: s.name.clone(),
            vmaddr: format!("{:#x}", s.vmaddr),
            vmsize: format!("{:#x}", s.vmsize),
            fileoff: format!("{:#x}", s.fileoff),
            filesize: format!("{:#x}", s.filesize),
            prot: format!("{}/{}", protection(s.initprot), protection(s.maxprot)),
            nsects: s.sections.len(),
        }
    }
}

#[derive(Serialize, Tabled)]
struct SectionRow {
    #[tabled(rename = "Segment")]
    segname: String,
    #[tabled(rename = "Section")]
    name: String,
    #[tabled(rename = "Addr")]
    addr: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Offset")]
    offset: String,
    #[tabled(rename = "Align")]
    align: String,
}

impl From<&SectionInfo> for SectionRow {
    fn from(s: &SectionInfo) -> Self {
        Self {
            segname: s.segname.clone(),
            name: s.name.clone(),
            addr: format!("{:#x}", s.addr),
            size: format!("{:#x}", s.size),
            offset: format!("{:#x}", s.offset),
            align: format!("2^{}", s.align),
        }
    }
}

/// `rwx`-style rendering of a VM protection mask.
fn protection(prot: i32) -> String {
    let flag = |bit: i32, c: char| if prot & bit != 0 { c } else { '-' };
    [
        flag(VM_PROT_READ, 'r'),
        flag(VM_PROT_WRITE, 'w'),
        flag(VM_PROT_EXECUTE, 'x'),
    ]
    .iter()
    .collect()
}

fn print_rows<T: Serialize + Tabled>(rows: &[T], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else {
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    Ok(())
}

fn open_image(cli: &Cli) -> Result<MachImage> {
    let image = MachImage::open(&cli.path, cli.arch.as_deref())?;
    log::info!(
        "{}: {} ({}), {} load commands",
        image.path,
        image.format_name(),
        image.arch.name,
        image.ncmds
    );
    Ok(image)
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Arches => {
            let bytes = std::fs::read(&cli.path)?;
            let rows: Vec<ArchRow> = architectures(&bytes)?.iter().map(ArchRow::from).collect();
            print_rows(&rows, cli.json)?;
        }

        Command::Segments => {
            let segments = open_image(&cli)?.segments();
            if segments.is_empty() && !cli.json {
                println!("No segments found.");
            } else {
                let rows: Vec<SegmentRow> = segments.iter().map(SegmentRow::from).collect();
                print_rows(&rows, cli.json)?;
            }
        }

        Command::Segment { name } => match open_image(&cli)?.find_segment(name) {
            Some(segment) => {
                if !cli.json {
                    println!("{} {}", "Found".green().bold(), segment.name.bold());
                }
                print_rows(&[SegmentRow::from(&segment)], cli.json)?;
                if !cli.json && !segment.sections.is_empty() {
                    let rows: Vec<SectionRow> =
                        segment.sections.iter().map(SectionRow::from).collect();
                    print_rows(&rows, false)?;
                }
            }
            None => {
                eprintln!("{} segment {}", "Not found:".red().bold(), name);
                return Ok(ExitCode::FAILURE);
            }
        },

        Command::Section { segment, section } => {
            match open_image(&cli)?.find_section(segment, section) {
                Some(sect) => {
                    if !cli.json {
                        println!("{} {},{}", "Found".green().bold(), sect.segname, sect.name.bold());
                    }
                    print_rows(&[SectionRow::from(&sect)], cli.json)?;
                }
                None => {
                    eprintln!("{} section {},{}", "Not found:".red().bold(), segment, section);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
