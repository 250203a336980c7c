use crate::aligned::AlignedBytes;
use crate::header::mach::{MachHeader, MachHeader64, MH_CIGAM, MH_CIGAM_64};
use crate::header::{Header, Layout, Mach32, Mach64, Section, Segment};
use crate::locate::{CommandTable, SegmentRef};
use anyhow::{anyhow, bail, Context, Result};
use byteorder::{ByteOrder, NativeEndian};
use goblin::mach::{cputype, Mach};
use goblin::Object;
use std::io::Cursor;
use std::mem::size_of;

/// One architecture slice of a (possibly universal) image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchInfo {
    pub name: String,
    pub cputype: u32,
    pub cpusubtype: u32,
    /// Offset of the slice within the file; 0 for a thin image.
    pub offset: u64,
    pub size: u64,
    pub is_64: bool,
}

/// Owned, width-independent summary of a segment command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub name: String,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: i32,
    pub initprot: i32,
    pub flags: u32,
    pub sections: Vec<SectionInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    pub name: String,
    pub segname: String,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub flags: u32,
}

impl SegmentInfo {
    fn from_ref<L: Layout>(seg: SegmentRef<'_, L>) -> Self {
        let cmd = seg.segment();
        Self {
            name: cmd.segname().to_string(),
            vmaddr: cmd.vmaddr(),
            vmsize: cmd.vmsize(),
            fileoff: cmd.fileoff(),
            filesize: cmd.filesize(),
            maxprot: cmd.maxprot(),
            initprot: cmd.initprot(),
            flags: cmd.flags(),
            sections: seg.sections().map(SectionInfo::from_record).collect(),
        }
    }
}

impl SectionInfo {
    fn from_record<S: Section>(sect: &S) -> Self {
        Self {
            name: sect.sectname().to_string(),
            segname: sect.segname().to_string(),
            addr: sect.addr(),
            size: sect.size(),
            offset: sect.offset(),
            align: sect.align(),
            flags: sect.flags(),
        }
    }
}

fn arch_name(cputype: u32, cpusubtype: u32) -> String {
    cputype::get_arch_name_from_types(cputype, cpusubtype & 0x00ff_ffff)
        .map(str::to_string)
        .unwrap_or_else(|| format!("cpu{cputype:#x}"))
}

/// Lists the architecture slices in `bytes`: one for a thin image, one per
/// entry for a universal binary.
pub fn architectures(bytes: &[u8]) -> Result<Vec<ArchInfo>> {
    match Object::parse(bytes).context("failed to parse image")? {
        Object::Mach(Mach::Binary(macho)) => {
            if macho.little_endian != cfg!(target_endian = "little") {
                bail!("byte-swapped Mach-O images are not supported");
            }
            Ok(vec![ArchInfo {
                name: arch_name(macho.header.cputype, macho.header.cpusubtype),
                cputype: macho.header.cputype,
                cpusubtype: macho.header.cpusubtype,
                offset: 0,
                size: bytes.len() as u64,
                is_64: macho.is_64,
            }])
        }
        Object::Mach(Mach::Fat(multi)) => multi
            .iter_arches()
            .map(|arch| -> Result<ArchInfo> {
                let arch = arch?;
                Ok(ArchInfo {
                    name: arch_name(arch.cputype, arch.cpusubtype),
                    cputype: arch.cputype,
                    cpusubtype: arch.cpusubtype,
                    offset: arch.offset as u64,
                    size: arch.size as u64,
                    is_64: arch.is_64(),
                })
            })
            .collect(),
        _ => bail!("not a Mach-O image"),
    }
}

/// The header and load-command table of one Mach-O slice, copied out of a
/// file so the same in-place lookups used on live images can run on it.
#[derive(Debug)]
pub struct MachImage {
    pub path: String,
    pub arch: ArchInfo,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    data: AlignedBytes,
}

impl MachImage {
    /// Reads a Mach-O file, selecting the slice named `arch` from a universal
    /// binary (the first slice when `arch` is `None`).
    pub fn open<P: AsRef<std::path::Path>>(path: P, arch: Option<&str>) -> Result<Self> {
        let buf = std::fs::read(&path)
            .with_context(|| format!("failed to read {}", path.as_ref().display()))?;
        let mut image = Self::from_bytes(&buf, arch)?;
        image.path = path.as_ref().display().to_string();
        Ok(image)
    }

    pub fn from_bytes(bytes: &[u8], arch: Option<&str>) -> Result<Self> {
        let arches = architectures(bytes)?;
        log::debug!("{} architecture slice(s) found", arches.len());

        let selected = match arch {
            Some(name) => arches
                .into_iter()
                .find(|a| a.name == name)
                .ok_or_else(|| anyhow!("architecture `{name}` not present in image"))?,
            None => arches
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("universal binary has no architectures"))?,
        };

        let start = selected.offset as usize;
        let slice = start
            .checked_add(selected.size as usize)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(|| anyhow!("slice for `{}` lies outside the file", selected.name))?;
        log::info!(
            "Using {} slice at {:#x} ({} bytes)",
            selected.name,
            selected.offset,
            selected.size
        );

        Self::from_slice(slice, selected)
    }

    fn from_slice(slice: &[u8], arch: ArchInfo) -> Result<Self> {
        let magic = slice
            .get(..4)
            .map(NativeEndian::read_u32)
            .ok_or_else(|| anyhow!("image too small for a Mach-O header"))?;

        match magic {
            MachHeader64::MAGIC => Self::from_header::<Mach64>(slice, arch),
            MachHeader::MAGIC => Self::from_header::<Mach32>(slice, arch),
            MH_CIGAM | MH_CIGAM_64 => bail!("byte-swapped Mach-O images are not supported"),
            other => bail!("unknown Mach-O magic {other:#x}"),
        }
    }

    fn from_header<L: Layout>(slice: &[u8], mut arch: ArchInfo) -> Result<Self> {
        let header = L::Header::from_reader(&mut Cursor::new(slice))?;
        if header.cputype() as u32 != arch.cputype {
            bail!(
                "{} slice holds an image for cpu {:#x}",
                arch.name,
                header.cputype() as u32
            );
        }
        if arch.is_64 != L::IS_64 {
            log::warn!(
                "{} slice declares a different width than its header; trusting the header",
                arch.name
            );
            arch.is_64 = L::IS_64;
        }

        let (ncmds, sizeofcmds) = (header.ncmds(), header.sizeofcmds());
        let end = size_of::<L::Header>()
            .checked_add(sizeofcmds as usize)
            .filter(|&end| end <= slice.len())
            .ok_or_else(|| {
                anyhow!("load commands ({sizeofcmds} bytes declared) extend past the end of the image")
            })?;
        log::debug!("{ncmds} load commands in {sizeofcmds} bytes");

        Ok(Self {
            path: String::from("<memory>"),
            arch,
            ncmds,
            sizeofcmds,
            data: AlignedBytes::copy_from(&slice[..end]),
        })
    }

    pub fn is_64(&self) -> bool {
        self.arch.is_64
    }

    pub fn format_name(&self) -> &'static str {
        if self.is_64() {
            Mach64::format_name()
        } else {
            Mach32::format_name()
        }
    }

    fn table<L: Layout>(&self) -> CommandTable<'_, L> {
        let commands = &self.data.as_bytes()[size_of::<L::Header>()..];
        CommandTable::new(commands, self.ncmds)
    }

    /// All segment commands, in load-command order.
    pub fn segments(&self) -> Vec<SegmentInfo> {
        fn collect<L: Layout>(table: CommandTable<'_, L>) -> Vec<SegmentInfo> {
            table.segments().map(SegmentInfo::from_ref).collect()
        }

        let segments = if self.is_64() {
            collect(self.table::<Mach64>())
        } else {
            collect(self.table::<Mach32>())
        };
        if segments.is_empty() {
            log::warn!("No segment commands found in {}", self.path);
        }
        segments
    }

    pub fn find_segment(&self, name: &str) -> Option<SegmentInfo> {
        let found = if self.is_64() {
            self.table::<Mach64>()
                .find_segment(name.as_bytes())
                .map(SegmentInfo::from_ref)
        } else {
            self.table::<Mach32>()
                .find_segment(name.as_bytes())
                .map(SegmentInfo::from_ref)
        };
        log::debug!("Segment {name}: {}", if found.is_some() { "found" } else { "not found" });
        found
    }

    pub fn find_section(&self, segname: &str, sectname: &str) -> Option<SectionInfo> {
        if self.is_64() {
            self.table::<Mach64>()
                .find_section(segname.as_bytes(), sectname.as_bytes())
                .map(SectionInfo::from_record)
        } else {
            self.table::<Mach32>()
                .find_section(segname.as_bytes(), sectname.as_bytes())
                .map(SectionInfo::from_record)
        }
    }
}
