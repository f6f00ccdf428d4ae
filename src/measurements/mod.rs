//! Measurement families synchronised by the collector.

pub mod day_ahead;
pub mod energy;
pub mod generation;
pub mod load;
pub mod physical_flow;

use crate::core::codes::{Area, area_by_name};
use crate::core::config::{FamilyKind, MeasurementNames};
use crate::core::currency::RateConverter;
use crate::core::error::{ProviderError, SyncError};
use crate::core::market::MarketDataProvider;
use crate::core::sync::{MeasurementFamily, SyncTarget};
use chrono_tz::Tz;
use std::sync::Arc;

pub use day_ahead::DayAheadFamily;
pub use energy::EnergyFamily;
pub use generation::GenerationFamily;
pub use load::LoadFamily;
pub use physical_flow::PhysicalFlowFamily;

/// The bidding area a per-area target is keyed by.
pub(crate) fn target_area(target: &SyncTarget) -> Result<&'static Area, SyncError> {
    area_by_name(&target.key)
        .ok_or_else(|| ProviderError::Other(format!("Unknown area {}", target.key)).into())
}

/// Builds the families named in `kinds`, in that order.
pub fn build_families(
    kinds: &[FamilyKind],
    market: Arc<dyn MarketDataProvider>,
    rates: Arc<dyn RateConverter>,
    names: &MeasurementNames,
    time_zone: Tz,
) -> Vec<Arc<dyn MeasurementFamily>> {
    kinds
        .iter()
        .map(|kind| -> Arc<dyn MeasurementFamily> {
            match kind {
                FamilyKind::Generation => {
                    Arc::new(GenerationFamily::new(market.clone(), &names.generation))
                }
                FamilyKind::Energy => Arc::new(EnergyFamily::new(market.clone(), &names.energy)),
                FamilyKind::Load => Arc::new(LoadFamily::new(market.clone(), &names.load)),
                FamilyKind::DayAhead => Arc::new(DayAheadFamily::new(
                    market.clone(),
                    rates.clone(),
                    &names.day_ahead,
                    time_zone,
                )),
                FamilyKind::PhysicalFlow => {
                    Arc::new(PhysicalFlowFamily::new(market.clone(), &names.physical_flow))
                }
            }
        })
        .collect()
}
