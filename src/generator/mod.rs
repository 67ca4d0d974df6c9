//! Configuration generating modules (CGM): the catalogue of supported
//! router hardware.

pub mod builtin;
pub mod devices;
pub mod protocols;
pub mod registry;

pub use devices::{DeviceDescriptor, InternalAntenna, Polarization, PortMapping};
pub use protocols::{Band, Capability, Protocol};
pub use registry::DeviceRegistry;
