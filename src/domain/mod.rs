// Domain layer: document model, migration records and ports. No HTTP or filesystem code here.

pub mod document;
pub mod model;
pub mod ports;
