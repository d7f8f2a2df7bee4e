//! Operational infrastructure shared by the binary and the library.

pub mod logging;
