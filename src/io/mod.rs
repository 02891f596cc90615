/*!
# IO utilities

Reading of corpus and count info files, atomic writing of every artifact,
binary frequency artifacts and the on-disk layout of a work directory.
!*/
pub mod artifact;
pub mod layout;
pub mod reader;
pub mod writer;

pub use layout::WorkDir;
