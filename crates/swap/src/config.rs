use std::path::PathBuf;

/// Environment variable overriding [SwapConfig::max_tiles_in_memory].
pub const MAX_TILES_ENV_VAR: &str = "TESSERA_MAX_TILES_IN_MEMORY";
/// Environment variable overriding [SwapConfig::eviction_batch_size].
pub const EVICTION_BATCH_ENV_VAR: &str = "TESSERA_EVICTION_BATCH";
/// Environment variable overriding [SwapConfig::swap_dir].
pub const SWAP_DIR_ENV_VAR: &str = "TESSERA_SWAP_DIR";

/// Thresholds and geometry for a [crate::TileManager].
///
/// Build with `SwapConfigBuilder`, or use struct update syntax over `Default::default()`.
#[derive(derivative::Derivative, derive_builder::Builder, Debug, Clone, PartialEq, Eq)]
#[derivative(Default)]
#[builder(default)]
pub struct SwapConfig {
    /// Once more than this many registered tiles are resident in memory, eviction kicks in.
    #[derivative(Default(value = "8192"))]
    pub max_tiles_in_memory: usize,

    /// How many eviction candidates are written out per sweep.
    #[derivative(Default(value = "64"))]
    pub eviction_batch_size: usize,

    /// Maximum number of buffer pools.  Requests which match no pool once this many exist go to the heap.
    #[derivative(Default(value = "4"))]
    pub max_pools: usize,

    /// Number of tile buffers carved out of each pool's arena.
    #[derivative(Default(value = "256"))]
    pub tiles_per_pool: usize,

    /// Where to put the swap file.  `None` means the OS temporary directory.
    #[builder(setter(into, strip_option))]
    pub swap_dir: Option<PathBuf>,

    /// When false, the manager never evicts anything.
    #[derivative(Default(value = "true"))]
    pub swap_enabled: bool,
}

fn env_usize(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("Ignoring {}={:?}: {}", name, raw, e);
            None
        }
    }
}

impl SwapConfig {
    /// The default configuration with any `TESSERA_*` environment overrides applied on top.
    pub fn from_env() -> SwapConfig {
        let mut config = SwapConfig::default();

        if let Some(v) = env_usize(MAX_TILES_ENV_VAR) {
            config.max_tiles_in_memory = v;
        }

        if let Some(v) = env_usize(EVICTION_BATCH_ENV_VAR) {
            config.eviction_batch_size = v;
        }

        if let Some(dir) = std::env::var_os(SWAP_DIR_ENV_VAR) {
            config.swap_dir = Some(PathBuf::from(dir));
        }

        config
    }
}
