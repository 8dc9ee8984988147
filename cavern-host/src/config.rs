//! The configuration for the host, given from environment variables and lazy
//! initialized when needed.

use std::num::NonZeroUsize;
use std::env;

use once_cell::race::OnceBool;
use once_cell::sync::OnceCell;


/// Return true if carvers should log every column they carve.
///
/// To enable this feature, set `CAVERN_VERBOSE=1`.
pub fn verbose() -> bool {
    static ENV: OnceBool = OnceBool::new();
    ENV.get_or_init(|| {
        env::var_os("CAVERN_VERBOSE")
            .map(|s| s.as_encoded_bytes() == b"1")
            .unwrap_or(false)
    })
}

/// Number of precompute workers, from `CAVERN_WORKERS`, none to use the default.
pub fn workers() -> Option<usize> {
    static ENV: OnceCell<Option<usize>> = OnceCell::new();
    *ENV.get_or_init(|| {
        env::var("CAVERN_WORKERS").ok()
            .and_then(|s| s.parse::<NonZeroUsize>().ok())
            .map(NonZeroUsize::get)
    })
}

/// World seed of the demo world, from `CAVERN_SEED`.
pub fn seed() -> i64 {
    static ENV: OnceCell<i64> = OnceCell::new();
    *ENV.get_or_init(|| {
        env::var("CAVERN_SEED").ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8_675_309)
    })
}
