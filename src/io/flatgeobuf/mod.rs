//! Write [FlatGeobuf](https://flatgeobuf.org/) files.

mod writer;

pub use writer::FlatGeobufEncoder;
