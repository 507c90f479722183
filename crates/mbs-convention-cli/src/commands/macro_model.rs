use std::time::Instant;

use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use mbs_convention_core::macro_model::{project_rate_path, MacroModelConfig, RateRule};
use mbs_convention_core::types::with_metadata;

use crate::input;

/// Arguments for reference-rate path projection
#[derive(Args)]
pub struct RatePathArgs {
    /// Path to a JSON or YAML macro scenario (MacroModelConfig)
    #[arg(long)]
    pub input: Option<String>,

    /// Current reference rate for a flat scenario when no input is given
    #[arg(long)]
    pub current_rate: Option<Decimal>,

    /// Mortgage rate spread over the reference rate for a flat scenario
    #[arg(long, default_value = "0")]
    pub refinancing_spread: Decimal,

    /// Number of periods to project
    #[arg(long, allow_hyphen_values = true)]
    pub horizon: i64,

    /// Payment periods per year
    #[arg(long, default_value_t = 12)]
    pub frequency: u32,
}

pub fn run_rate_path(args: RatePathArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config: MacroModelConfig = if let Some(ref path) = args.input {
        input::file::read_document(path)?
    } else if let Some(rate) = args.current_rate {
        MacroModelConfig {
            current_rate: rate,
            refinancing_spread: args.refinancing_spread,
            rule: RateRule::Flat,
        }
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <macro.json>, --current-rate or stdin required for rate-path".into());
    };

    let start = Instant::now();
    let path = project_rate_path(&config, args.horizon, args.frequency)?;
    let warnings = path.warnings.clone();
    let output = with_metadata(
        "Deterministic reference-rate projection",
        &config,
        warnings,
        start.elapsed().as_micros() as u64,
        path,
    );
    Ok(serde_json::to_value(output)?)
}
