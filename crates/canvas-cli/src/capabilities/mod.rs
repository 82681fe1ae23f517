//! Capabilities the assistant can invoke on the host

mod set_title;
mod sql_chart;

pub use set_title::set_title;
pub use sql_chart::{ChartConfig, SqlChartCapability};

use std::sync::Arc;

use canvas_assistant::CapabilityRegistry;
use parking_lot::Mutex;

/// What the capabilities have changed on the host so far
#[derive(Debug, Default)]
pub struct HostState {
    /// Session title shown in the prompt
    pub title: Option<String>,
    /// Most recent chart configuration
    pub chart: Option<ChartConfig>,
}

pub type SharedHostState = Arc<Mutex<HostState>>;

/// Registry with every host capability bound to `state`
pub fn host_registry(state: &SharedHostState) -> canvas_assistant::Result<CapabilityRegistry> {
    CapabilityRegistry::new()
        .with(set_title(state.clone()))?
        .with(Arc::new(SqlChartCapability::new(state.clone())))
}
