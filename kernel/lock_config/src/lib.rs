//! Compile-time configuration shared by the MCS lock crates.
//!
//! Values that depend on the target are selected per architecture;
//! everything else lives in [`lock`].

#![no_std]

cfg_if::cfg_if! {

if #[cfg(target_arch = "aarch64")] {
    pub mod aarch64;
    pub use aarch64::cpu;
} else {
    pub mod generic;
    pub use generic::cpu;
}

}

pub mod lock;

pub use cpu::{CACHE_LINE_SIZE, MAX_CORES};
pub use lock::*;
