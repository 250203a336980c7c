use crate::header::{Header, Section as SectionRecord, Segment};
use crate::name::FixedName;
use byteorder::{NativeEndian, ReadBytesExt};
use std::io;
use zerocopy::{FromBytes, Immutable, KnownLayout};

// Header magics, native and byte-swapped.
pub const MH_MAGIC: u32 = 0xfeed_face;
pub const MH_CIGAM: u32 = 0xcefa_edfe;
pub const MH_MAGIC_64: u32 = 0xfeed_facf;
pub const MH_CIGAM_64: u32 = 0xcffa_edfe;

// Load command tags.
pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_UUID: u32 = 0x1b;

// Segment protections.
pub const VM_PROT_READ: i32 = 0x1;
pub const VM_PROT_WRITE: i32 = 0x2;
pub const VM_PROT_EXECUTE: i32 = 0x4;

/// The `(cmd, cmdsize)` prefix shared by every load command.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct LoadCommand {
    pub cmd: u32,

    /// Total size of the record in bytes, prefix included.
    pub cmdsize: u32,
}

/// Represents the header of a 32-bit Mach-O image (`struct mach_header`).
///
/// It sits at the very start of the mapped image and is immediately followed
/// by `ncmds` load commands totalling `sizeofcmds` bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct MachHeader {
    /// `MH_MAGIC` in native byte order.
    pub magic: u32,

    /// CPU specifier (e.g. `CPU_TYPE_ARM`, `CPU_TYPE_I386`).
    pub cputype: i32,

    /// Machine specifier refining `cputype`.
    pub cpusubtype: i32,

    /// Kind of image.
    ///
    /// Common values:
    /// - `MH_OBJECT` (1): Relocatable object
    /// - `MH_EXECUTE` (2): Executable
    /// - `MH_DYLIB` (6): Dynamic library
    /// - `MH_BUNDLE` (8): Bundle
    pub filetype: u32,

    /// Number of load commands.
    pub ncmds: u32,

    /// Byte length of all load commands.
    pub sizeofcmds: u32,

    pub flags: u32,
}

/// Represents the header of a 64-bit Mach-O image (`struct mach_header_64`).
///
/// Same fields as [`MachHeader`] plus a trailing reserved word, which keeps
/// the load commands that follow 8-byte aligned.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct MachHeader64 {
    /// `MH_MAGIC_64` in native byte order.
    pub magic: u32,
    pub cputype: i32,
    pub cpusubtype: i32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
    pub reserved: u32,
}

/// A 32-bit segment load command (`LC_SEGMENT`).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct SegmentCommand {
    pub cmd: u32,

    /// Includes the `nsects` section records that follow.
    pub cmdsize: u32,
    pub segname: FixedName,
    pub vmaddr: u32,
    pub vmsize: u32,
    pub fileoff: u32,
    pub filesize: u32,

    /// Maximum VM protection.
    pub maxprot: i32,

    /// Initial VM protection.
    pub initprot: i32,
    pub nsects: u32,
    pub flags: u32,
}

/// A 64-bit segment load command (`LC_SEGMENT_64`).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct SegmentCommand64 {
    pub cmd: u32,
    pub cmdsize: u32,
    pub segname: FixedName,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: i32,
    pub initprot: i32,
    pub nsects: u32,
    pub flags: u32,
}

/// A 32-bit section record (`struct section`).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Section {
    pub sectname: FixedName,

    /// Name of the segment this section is meant to land in.
    pub segname: FixedName,
    pub addr: u32,
    pub size: u32,

    /// File offset of the section contents.
    pub offset: u32,

    /// Alignment as a power of two.
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
}

/// A 64-bit section record (`struct section_64`).
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Section64 {
    pub sectname: FixedName,
    pub segname: FixedName,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    pub reserved3: u32,
}

impl Header for MachHeader {
    const MAGIC: u32 = MH_MAGIC;

    fn cputype(&self) -> i32 {
        self.cputype
    }

    fn ncmds(&self) -> u32 {
        self.ncmds
    }

    fn sizeofcmds(&self) -> u32 {
        self.sizeofcmds
    }

    fn is_64(&self) -> bool {
        false
    }

    fn from_reader<R: io::Read>(cur: &mut R) -> anyhow::Result<MachHeader> {
        Ok(MachHeader {
            magic: cur.read_u32::<NativeEndian>()?,
            cputype: cur.read_i32::<NativeEndian>()?,
            cpusubtype: cur.read_i32::<NativeEndian>()?,
            filetype: cur.read_u32::<NativeEndian>()?,
            ncmds: cur.read_u32::<NativeEndian>()?,
            sizeofcmds: cur.read_u32::<NativeEndian>()?,
            flags: cur.read_u32::<NativeEndian>()?,
        })
    }
}

impl Header for MachHeader64 {
    const MAGIC: u32 = MH_MAGIC_64;

    fn cputype(&self) -> i32 {
        self.cputype
    }

    fn ncmds(&self) -> u32 {
        self.ncmds
    }

    fn sizeofcmds(&self) -> u32 {
        self.sizeofcmds
    }

    fn is_64(&self) -> bool {
        true
    }

    fn from_reader<R: io::Read>(cur: &mut R) -> anyhow::Result<MachHeader64> {
        Ok(MachHeader64 {
            magic: cur.read_u32::<NativeEndian>()?,
            cputype: cur.read_i32::<NativeEndian>()?,
            cpusubtype: cur.read_i32::<NativeEndian>()?,
            filetype: cur.read_u32::<NativeEndian>()?,
            ncmds: cur.read_u32::<NativeEndian>()?,
            sizeofcmds: cur.read_u32::<NativeEndian>()?,
            flags: cur.read_u32::<NativeEndian>()?,
            reserved: cur.read_u32::<NativeEndian>()?,
        })
    }
}

impl Segment for SegmentCommand {
    const CMD: u32 = LC_SEGMENT;

    fn cmd(&self) -> u32 {
        self.cmd
    }

    fn cmdsize(&self) -> u32 {
        self.cmdsize
    }

    fn segname(&self) -> &FixedName {
        &self.segname
    }

    fn vmaddr(&self) -> u64 {
        self.vmaddr as u64
    }

    fn vmsize(&self) -> u64 {
        self.vmsize as u64
    }

    fn fileoff(&self) -> u64 {
        self.fileoff as u64
    }

    fn filesize(&self) -> u64 {
        self.filesize as u64
    }

    fn maxprot(&self) -> i32 {
        self.maxprot
    }

    fn initprot(&self) -> i32 {
        self.initprot
    }

    fn nsects(&self) -> u32 {
        self.nsects
    }

    fn flags(&self) -> u32 {
        self.flags
    }
}

impl Segment for SegmentCommand64 {
    const CMD: u32 = LC_SEGMENT_64;

    fn cmd(&self) -> u32 {
        self.cmd
    }

    fn cmdsize(&self) -> u32 {
        self.cmdsize
    }

    fn segname(&self) -> &FixedName {
        &self.segname
    }

    fn vmaddr(&self) -> u64 {
        self.vmaddr
    }

    fn vmsize(&self) -> u64 {
        self.vmsize
    }

    fn fileoff(&self) -> u64 {
        self.fileoff
    }

    fn filesize(&self) -> u64 {
        self.filesize
    }

    fn maxprot(&self) -> i32 {
        self.maxprot
    }

    fn initprot(&self) -> i32 {
        self.initprot
    }

    fn nsects(&self) -> u32 {
        self.nsects
    }

    fn flags(&self) -> u32 {
        self.flags
    }
}

impl SectionRecord for Section {
    fn sectname(&self) -> &FixedName {
        &self.sectname
    }

    fn segname(&self) -> &FixedName {
        &self.segname
    }

    fn addr(&self) -> u64 {
        self.addr as u64
    }

    fn size(&self) -> u64 {
        self.size as u64
    }

    fn offset(&self) -> u32 {
        self.offset
    }

    fn align(&self) -> u32 {
        self.align
    }

    fn flags(&self) -> u32 {
        self.flags
    }
}

impl SectionRecord for Section64 {
    fn sectname(&self) -> &FixedName {
        &self.sectname
    }

    fn segname(&self) -> &FixedName {
        &self.segname
    }

    fn addr(&self) -> u64 {
        self.addr
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn offset(&self) -> u32 {
        self.offset
    }

    fn align(&self) -> u32 {
        self.align
    }

    fn flags(&self) -> u32 {
        self.flags
    }
}
