//! # Cache
//!
//! Cache resources shared by processors.
//!
//! Provides:
//! - `MemoryCache`: in-process map with optional TTL
//! - `SubprocessCache`: delegates `get` to an external command per call
//! - `CacheRegistry`: named cache instances built from `ResourcesConfig`
//!
//! ## Subprocess contract
//!
//! ```text
//! argv   = [args..., operation, key]
//! exit 0 = stdout is the value
//! exit 1 = key not found
//! other  = error carrying stderr
//! ```

mod memory;
mod registry;
mod subprocess;

pub use contracts::{Cache, CacheError};
pub use memory::MemoryCache;
pub use registry::CacheRegistry;
pub use subprocess::SubprocessCache;
