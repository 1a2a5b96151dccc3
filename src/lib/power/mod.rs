pub mod cpu;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    metrics::ResultsSink,
    session::{PageDefinition, Tab},
};

pub use cpu::CpuUsageMonitor;

/// For platforms without a power source to sample. Reports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPowerMonitor;

#[async_trait]
impl crate::session::PowerMonitor for NoPowerMonitor {
    async fn start(&mut self, _page: &PageDefinition, _tab: &mut dyn Tab) -> Result<()> {
        Ok(())
    }

    async fn stop(&mut self, _tab: &mut dyn Tab) -> Result<()> {
        Ok(())
    }

    fn report_into(&mut self, _sink: &mut dyn ResultsSink) {}
}
