pub mod mach;

use crate::name::FixedName;
use std::fmt::Debug;
use std::io;
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// A fixed-layout record that can be viewed in place over image bytes.
pub trait Record: FromBytes + KnownLayout + Immutable + Copy + Debug + Send + Sync + 'static {}

impl<T> Record for T where T: FromBytes + KnownLayout + Immutable + Copy + Debug + Send + Sync + 'static {}

/// The image header that precedes the load-command table.
pub trait Header: Record {
    /// Native-endian magic identifying this width.
    const MAGIC: u32;

    /// Returns the CPU type the image was built for.
    fn cputype(&self) -> i32;

    /// Returns the number of load commands.
    fn ncmds(&self) -> u32;

    /// Returns the byte length of the load-command table.
    fn sizeofcmds(&self) -> u32;

    /// Returns true if this is a 64-bit header.
    fn is_64(&self) -> bool;

    fn from_reader<R: io::Read>(cur: &mut R) -> anyhow::Result<Self>;
}

/// A segment load command as laid out in memory.
pub trait Segment: Record {
    /// Load-command tag identifying this record.
    const CMD: u32;

    fn cmd(&self) -> u32;
    fn cmdsize(&self) -> u32;
    fn segname(&self) -> &FixedName;
    fn vmaddr(&self) -> u64;
    fn vmsize(&self) -> u64;
    fn fileoff(&self) -> u64;
    fn filesize(&self) -> u64;
    fn maxprot(&self) -> i32;
    fn initprot(&self) -> i32;

    /// Number of section records following this one.
    fn nsects(&self) -> u32;
    fn flags(&self) -> u32;
}

/// A section record following its segment command.
pub trait Section: Record {
    fn sectname(&self) -> &FixedName;
    fn segname(&self) -> &FixedName;
    fn addr(&self) -> u64;
    fn size(&self) -> u64;
    fn offset(&self) -> u32;
    fn align(&self) -> u32;
    fn flags(&self) -> u32;
}

/// Ties together the record types of one image width.
///
/// The traversal in [`crate::locate`] is written once against this trait and
/// instantiated for [`Mach32`] and [`Mach64`].
pub trait Layout: 'static {
    type Header: Header;
    type Segment: Segment;
    type Section: Section;

    const IS_64: bool;

    /// Returns a short human-readable name, e.g. "Mach-O 64".
    fn format_name() -> &'static str;
}

/// 32-bit images: `mach_header`, `LC_SEGMENT`, `section`.
#[derive(Debug)]
pub enum Mach32 {}

/// 64-bit images: `mach_header_64`, `LC_SEGMENT_64`, `section_64`.
#[derive(Debug)]
pub enum Mach64 {}

impl Layout for Mach32 {
    type Header = mach::MachHeader;
    type Segment = mach::SegmentCommand;
    type Section = mach::Section;

    const IS_64: bool = false;

    fn format_name() -> &'static str {
        "Mach-O 32"
    }
}

impl Layout for Mach64 {
    type Header = mach::MachHeader64;
    type Segment = mach::SegmentCommand64;
    type Section = mach::Section64;

    const IS_64: bool = true;

    fn format_name() -> &'static str {
        "Mach-O 64"
    }
}

/// The layout matching the pointer width of the build target.
#[cfg(target_pointer_width = "64")]
pub type Native = Mach64;
#[cfg(target_pointer_width = "32")]
pub type Native = Mach32;
