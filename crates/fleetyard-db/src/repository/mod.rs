//! One repository per entity, each owning a handle to the shared pool

mod device;
mod device_type;
mod firmware;
mod group;

pub use device::DeviceRepository;
pub use device_type::DeviceTypeRepository;
pub use firmware::FirmwareRepository;
pub use group::GroupRepository;
