//! Synthetic Mach-O images for unit tests.

use crate::aligned::AlignedBytes;
use crate::header::mach::{LC_UUID, VM_PROT_EXECUTE, VM_PROT_READ};
use crate::header::{Header, Layout, Segment};
use std::marker::PhantomData;
use std::mem::size_of;
use zerocopy::FromBytes;

pub(crate) const CPU_TYPE_ARM64: u32 = 0x0100_000c;

/// Builds a header followed by a load-command table, native endian.
pub(crate) struct ImageBuilder<L: Layout> {
    commands: Vec<u8>,
    ncmds: u32,
    ncmds_override: Option<u32>,
    sizeofcmds_override: Option<u32>,
    cputype: u32,
    _layout: PhantomData<L>,
}

impl<L: Layout> ImageBuilder<L> {
    pub(crate) fn new() -> Self {
        Self {
            commands: Vec::new(),
            ncmds: 0,
            ncmds_override: None,
            sizeofcmds_override: None,
            cputype: CPU_TYPE_ARM64,
            _layout: PhantomData,
        }
    }

    pub(crate) fn segment_size() -> usize {
        size_of::<L::Segment>()
    }

    pub(crate) fn section_size() -> usize {
        size_of::<L::Section>()
    }

    /// A generic record: `(cmd, cmdsize)` followed by zero fill up to `cmdsize`.
    pub(crate) fn command(mut self, cmd: u32, cmdsize: u32) -> Self {
        let start = self.commands.len();
        self.put_u32(cmd);
        self.put_u32(cmdsize);
        let end = start + (cmdsize as usize).max(8);
        self.commands.resize(end, 0);
        self.ncmds += 1;
        self
    }

    /// An `LC_UUID` record, 24 bytes.
    pub(crate) fn uuid(self) -> Self {
        self.command(LC_UUID, 24)
    }

    pub(crate) fn segment(self, name: &[u8], vmaddr: u64) -> Self {
        self.segment_with_sections(name, vmaddr, &[])
    }

    /// A segment record followed by `(sectname, segname)` section records.
    pub(crate) fn segment_with_sections(
        mut self,
        name: &[u8],
        vmaddr: u64,
        sections: &[(&str, &str)],
    ) -> Self {
        let cmdsize = Self::segment_size() + sections.len() * Self::section_size();
        let start = self.commands.len();
        self.commands.resize(start + cmdsize, 0);

        let rec = &mut self.commands[start..start + cmdsize];
        rec[0..4].copy_from_slice(&<L::Segment as Segment>::CMD.to_ne_bytes());
        rec[4..8].copy_from_slice(&(cmdsize as u32).to_ne_bytes());
        rec[8..8 + name.len()].copy_from_slice(name);
        let prot = VM_PROT_READ | VM_PROT_EXECUTE;
        let nsects = sections.len() as u32;
        if L::IS_64 {
            rec[24..32].copy_from_slice(&vmaddr.to_ne_bytes());
            rec[32..40].copy_from_slice(&0x4000u64.to_ne_bytes());
            rec[56..60].copy_from_slice(&prot.to_ne_bytes());
            rec[60..64].copy_from_slice(&prot.to_ne_bytes());
            rec[64..68].copy_from_slice(&nsects.to_ne_bytes());
        } else {
            rec[24..28].copy_from_slice(&(vmaddr as u32).to_ne_bytes());
            rec[28..32].copy_from_slice(&0x4000u32.to_ne_bytes());
            rec[40..44].copy_from_slice(&prot.to_ne_bytes());
            rec[44..48].copy_from_slice(&prot.to_ne_bytes());
            rec[48..52].copy_from_slice(&nsects.to_ne_bytes());
        }

        for (i, (sectname, segname)) in sections.iter().enumerate() {
            let off = Self::segment_size() + i * Self::section_size();
            let sect = &mut rec[off..off + Self::section_size()];
            sect[0..sectname.len()].copy_from_slice(sectname.as_bytes());
            sect[16..16 + segname.len()].copy_from_slice(segname.as_bytes());
            let addr = vmaddr + 0x100 * (i as u64 + 1);
            if L::IS_64 {
                sect[32..40].copy_from_slice(&addr.to_ne_bytes());
                sect[40..48].copy_from_slice(&0x80u64.to_ne_bytes());
            } else {
                sect[32..36].copy_from_slice(&(addr as u32).to_ne_bytes());
                sect[36..40].copy_from_slice(&0x80u32.to_ne_bytes());
            }
        }

        self.ncmds += 1;
        self
    }

    /// Overrides the declared command count.
    pub(crate) fn ncmds(mut self, ncmds: u32) -> Self {
        self.ncmds_override = Some(ncmds);
        self
    }

    /// Overrides the declared size of the command table.
    pub(crate) fn sizeofcmds(mut self, sizeofcmds: u32) -> Self {
        self.sizeofcmds_override = Some(sizeofcmds);
        self
    }

    pub(crate) fn cputype(mut self, cputype: u32) -> Self {
        self.cputype = cputype;
        self
    }

    /// The raw header and commands, not yet aligned.
    pub(crate) fn to_vec(&self) -> Vec<u8> {
        let magic = <L::Header as Header>::MAGIC;
        let ncmds = self.ncmds_override.unwrap_or(self.ncmds);
        let sizeofcmds = self
            .sizeofcmds_override
            .unwrap_or(self.commands.len() as u32);

        let mut out = Vec::new();
        // magic, cputype, cpusubtype, filetype (MH_EXECUTE), ncmds, sizeofcmds, flags
        for word in [magic, self.cputype, 0, 2, ncmds, sizeofcmds, 0] {
            out.extend_from_slice(&word.to_ne_bytes());
        }
        if L::IS_64 {
            out.extend_from_slice(&0u32.to_ne_bytes());
        }
        out.extend_from_slice(&self.commands);
        out
    }

    pub(crate) fn build(&self) -> AlignedBytes {
        AlignedBytes::copy_from(&self.to_vec())
    }

    fn put_u32(&mut self, value: u32) {
        self.commands.extend_from_slice(&value.to_ne_bytes());
    }
}

/// Views the start of a built image as its header.
pub(crate) fn header_of<L: Layout>(image: &AlignedBytes) -> &L::Header {
    let (header, _) = <L::Header as FromBytes>::ref_from_prefix(image.as_bytes())
        .unwrap_or_else(|_| panic!("built images start with an aligned header"));
    header
}
