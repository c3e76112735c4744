/// Core topology assumed for hosted builds and other architectures.
pub mod cpu {
    /// Assumed cache line size in bytes.
    pub const CACHE_LINE_SIZE: usize = 64;

    pub const MAX_CORES: usize = 8;
}
