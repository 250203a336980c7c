pub mod aligned;
pub mod header;
pub mod image;
pub mod locate;
pub mod name;

#[cfg(test)]
mod testutil;

pub use header::{Header, Layout, Mach32, Mach64, Native, Record, Section, Segment};
pub use image::*;
pub use locate::*;
pub use name::{FixedName, NAME_LEN};
