// Domain layer: core models and ports (interfaces) shared by the monitoring pipeline and the node services.

pub mod model;
pub mod ports;
