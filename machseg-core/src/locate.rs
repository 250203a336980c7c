//! Segment and section lookup over a Mach-O load-command table.
//!
//! Everything in this module reads in place: no allocation, no locks and no
//! logging, so it can run from a signal handler while the process is crashing.
//! Every step checks both the declared command count and the bytes left in
//! the table; a record that is too short, too long or misaligned ends the scan
//! and the lookup reports "not found".

use crate::header::mach::LoadCommand;
use crate::header::{Header, Layout, Native, Record, Section, Segment};
use crate::name::{fits, FixedName};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem::size_of;
use zerocopy::FromBytes;

const LOAD_COMMAND_SIZE: usize = size_of::<LoadCommand>();

/// Views the start of `bytes` as a `T`, if it is long enough and aligned.
fn view<T: Record>(bytes: &[u8]) -> Option<&T> {
    T::ref_from_prefix(bytes).ok().map(|(record, _)| record)
}

/// One load command: its tag and its full record, prefix included.
#[derive(Debug, Clone, Copy)]
pub struct LoadCommandRef<'a> {
    pub cmd: u32,
    pub bytes: &'a [u8],
}

impl<'a> LoadCommandRef<'a> {
    /// Views the record as a segment of layout `L`.
    ///
    /// Returns `None` for other tags and for records too short or misaligned
    /// to hold a segment command.
    pub fn as_segment<L: Layout>(&self) -> Option<SegmentRef<'a, L>> {
        if self.cmd != <L::Segment as Segment>::CMD {
            return None;
        }
        let segment = view::<L::Segment>(self.bytes)?;
        Some(SegmentRef {
            segment,
            record: self.bytes,
        })
    }
}

/// Iterator over the records of a [`CommandTable`].
///
/// Yields at most `ncmds` records and stops early, for good, at the first
/// record whose declared size is below the prefix size or runs past the table.
#[derive(Debug, Clone)]
pub struct LoadCommands<'a> {
    rest: &'a [u8],
    remaining: u32,
}

impl<'a> LoadCommands<'a> {
    fn stop(&mut self) -> Option<LoadCommandRef<'a>> {
        self.rest = &[];
        self.remaining = 0;
        None
    }
}

impl<'a> Iterator for LoadCommands<'a> {
    type Item = LoadCommandRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let Ok((prefix, _)) = LoadCommand::read_from_prefix(self.rest) else {
            return self.stop();
        };
        let (cmd, cmdsize) = (prefix.cmd, prefix.cmdsize as usize);
        if cmdsize < LOAD_COMMAND_SIZE || cmdsize > self.rest.len() {
            return self.stop();
        }

        let (bytes, rest) = self.rest.split_at(cmdsize);
        self.rest = rest;
        self.remaining -= 1;
        Some(LoadCommandRef { cmd, bytes })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

impl FusedIterator for LoadCommands<'_> {}

/// A located segment command together with the record bytes it heads.
pub struct SegmentRef<'a, L: Layout> {
    segment: &'a L::Segment,
    record: &'a [u8],
}

impl<L: Layout> Clone for SegmentRef<'_, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L: Layout> Copy for SegmentRef<'_, L> {}

impl<L: Layout> std::fmt::Debug for SegmentRef<'_, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentRef")
            .field("segment", self.segment)
            .field("cmdsize", &self.record.len())
            .finish()
    }
}

impl<'a, L: Layout> SegmentRef<'a, L> {
    /// The segment command, pointing into the image.
    pub fn segment(&self) -> &'a L::Segment {
        self.segment
    }

    pub fn name(&self) -> &'a FixedName {
        self.segment.segname()
    }

    /// The whole record, section records included.
    pub fn record(&self) -> &'a [u8] {
        self.record
    }

    /// The section records following the segment command.
    pub fn sections(&self) -> Sections<'a, L> {
        Sections {
            rest: &self.record[size_of::<L::Segment>()..],
            remaining: self.segment.nsects(),
            _layout: PhantomData,
        }
    }

    pub fn find_section(&self, sectname: &[u8]) -> Option<&'a L::Section> {
        if !fits(sectname) {
            return None;
        }
        self.sections().find(|sect| sect.sectname().matches(sectname))
    }
}

/// Iterator over the section records of one segment.
///
/// Bounded by the segment's `nsects` and by its own `cmdsize`, whichever
/// runs out first.
pub struct Sections<'a, L: Layout> {
    rest: &'a [u8],
    remaining: u32,
    _layout: PhantomData<L>,
}

impl<'a, L: Layout> Iterator for Sections<'a, L> {
    type Item = &'a L::Section;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let Some(section) = view::<L::Section>(self.rest) else {
            self.remaining = 0;
            return None;
        };
        self.rest = &self.rest[size_of::<L::Section>()..];
        self.remaining -= 1;
        Some(section)
    }
}

impl<L: Layout> FusedIterator for Sections<'_, L> {}

/// The load-command table of one image, viewed in place.
pub struct CommandTable<'a, L: Layout> {
    bytes: &'a [u8],
    ncmds: u32,
    _layout: PhantomData<L>,
}

impl<L: Layout> Clone for CommandTable<'_, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L: Layout> Copy for CommandTable<'_, L> {}

impl<L: Layout> std::fmt::Debug for CommandTable<'_, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTable")
            .field("format", &L::format_name())
            .field("ncmds", &self.ncmds)
            .field("sizeofcmds", &self.bytes.len())
            .finish()
    }
}

impl<'a, L: Layout> CommandTable<'a, L> {
    /// `bytes` is the whole table (`sizeofcmds` long), starting right after
    /// the image header.
    pub fn new(bytes: &'a [u8], ncmds: u32) -> Self {
        Self {
            bytes,
            ncmds,
            _layout: PhantomData,
        }
    }

    /// Views the table that follows `header` in memory.
    ///
    /// # Safety
    ///
    /// `header` must be followed by `header.sizeofcmds()` readable bytes that
    /// stay mapped and unmodified for `'a`.
    pub unsafe fn from_header(header: &'a L::Header) -> Self {
        let start = (header as *const L::Header).add(1).cast::<u8>();
        let bytes = std::slice::from_raw_parts(start, header.sizeofcmds() as usize);
        Self::new(bytes, header.ncmds())
    }

    pub fn iter(&self) -> LoadCommands<'a> {
        LoadCommands {
            rest: self.bytes,
            remaining: self.ncmds,
        }
    }

    /// Segment commands in table order.
    ///
    /// Ends at the first segment-tagged record that cannot hold a segment
    /// command, like [`LoadCommands`] ends at a malformed record.
    pub fn segments(&self) -> impl Iterator<Item = SegmentRef<'a, L>> + 'a {
        self.iter()
            .filter(|cmd| cmd.cmd == <L::Segment as Segment>::CMD)
            .map_while(|cmd| cmd.as_segment::<L>())
    }

    /// First segment whose name equals `name`.
    pub fn find_segment(&self, name: &[u8]) -> Option<SegmentRef<'a, L>> {
        if !fits(name) || self.ncmds == 0 {
            return None;
        }
        self.segments().find(|seg| seg.name().matches(name))
    }

    /// First section named `sectname` whose own segment name is `segname`.
    ///
    /// Section records carry their target segment name, and in object files
    /// every section lives in a single unnamed segment, so the match is on
    /// the section record rather than on the enclosing segment command.
    pub fn find_section(&self, segname: &[u8], sectname: &[u8]) -> Option<&'a L::Section> {
        if !fits(segname) || !fits(sectname) || self.ncmds == 0 {
            return None;
        }
        self.segments().find_map(|seg| {
            seg.sections().find(|sect| {
                sect.segname().matches(segname) && sect.sectname().matches(sectname)
            })
        })
    }
}

/// Returns the segment command named `name` in the image headed by `header`.
///
/// The result points into the caller's image. `None` covers both a missing
/// segment and a malformed table.
///
/// # Safety
///
/// `header` must be followed by `header.sizeofcmds()` readable bytes that
/// stay mapped and unmodified for `'a`.
pub unsafe fn locate_segment<'a, L: Layout>(
    header: &'a L::Header,
    name: &[u8],
) -> Option<&'a L::Segment> {
    if !fits(name) || header.ncmds() == 0 {
        return None;
    }
    CommandTable::<L>::from_header(header)
        .find_segment(name)
        .map(|seg| seg.segment())
}

/// Returns the section `segname,sectname` in the image headed by `header`.
///
/// # Safety
///
/// Same contract as [`locate_segment`].
pub unsafe fn locate_section<'a, L: Layout>(
    header: &'a L::Header,
    segname: &[u8],
    sectname: &[u8],
) -> Option<&'a L::Section> {
    if header.ncmds() == 0 {
        return None;
    }
    CommandTable::<L>::from_header(header).find_section(segname, sectname)
}

/// [`locate_segment`] for images of the build target's own width.
///
/// # Safety
///
/// Same contract as [`locate_segment`].
pub unsafe fn getsegbynamefromheader<'a>(
    header: &'a <Native as Layout>::Header,
    name: &[u8],
) -> Option<&'a <Native as Layout>::Segment> {
    locate_segment::<Native>(header, name)
}
