pub mod converter;
pub mod poller;

pub use converter::{ConversionReport, ShipmentConverter};
pub use poller::{CycleReport, Poller};
