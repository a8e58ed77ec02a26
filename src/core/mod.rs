pub mod backend;
pub mod director;
pub mod rate_limit;
pub mod registry;
pub mod selection;
pub mod special;
pub mod trust;

pub use director::DirectorService;
pub use rate_limit::SlidingWindowLimiter;
pub use registry::CdnRegistry;
pub use selection::SelectionEngine;
pub use special::SpecialSetCache;
pub use trust::TrustedHosts;
