// Domain layer: records, batch results and the ports the pipeline talks through.

pub mod model;
pub mod ports;
