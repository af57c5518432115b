mod clock;
mod metadata;
mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use metadata::{CacheError, DETAIL_METADATA_FILE, LIST_METADATA_FILE};
pub use ttl::{DEFAULT_TTL, TtlCache};
