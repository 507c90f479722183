use crate::error::Stage;

/// Observation hook for the horizon-scaled stages. Called once per projected
/// period; it cannot influence the calculation.
pub trait ProgressObserver {
    fn on_period(&self, stage: Stage, period: u32, total: u32);
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_period(&self, _stage: Stage, _period: u32, _total: u32) {}
}

/// Reports progress through `tracing` at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_period(&self, stage: Stage, period: u32, total: u32) {
        tracing::debug!(%stage, period, total, "period projected");
    }
}

impl<F> ProgressObserver for F
where
    F: Fn(Stage, u32, u32),
{
    fn on_period(&self, stage: Stage, period: u32, total: u32) {
        self(stage, period, total)
    }
}
