pub mod projection;
pub mod rate_path;

pub use projection::{project_rate_path, ForecastPoint, MacroModelConfig, RateRule};
pub use rate_path::{RatePath, RatePathPoint};
