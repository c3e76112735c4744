/// Core topology of the Phytium aarch64 parts (E2000/D2000/FT2000-4 class).
pub mod cpu {
    /// Cortex-A and FTC cores all use 64-byte L1 data cache lines.
    pub const CACHE_LINE_SIZE: usize = 64;

    /// The largest number of cores that may take part in one cross-core lock.
    /// D2000 has eight cores; smaller parts simply leave the upper nodes unused.
    pub const MAX_CORES: usize = 8;
}
