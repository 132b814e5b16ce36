//! Toolchain location for CMake, NDK and Ninja.
//!
//! Each locator walks a fixed precedence order over candidate install
//! locations and records every consideration in a [`ConfigureLog`], so a
//! failed resolution produces one aggregate message naming everything that
//! was checked and why it was rejected. Collaborators (the SDK package
//! listing, the process `PATH`, version probing) come in as narrow
//! functions, which keeps the precedence logic testable without real
//! toolchains on disk and lets tests observe that listings are only
//! fetched when the precedence order actually reaches them.

pub mod cmake;
pub mod ndk;
pub mod ninja;

pub use cmake::{DEFAULT_CMAKE_VERSION, find_cmake_path};
pub use ndk::find_ndk_path;
pub use ninja::find_ninja_path;
