mod position_cache;

pub use position_cache::{
    CacheStats, PositionCache, DEFAULT_MAX_POSITIONS, DEFAULT_POSITION_TTL_SECS,
};
