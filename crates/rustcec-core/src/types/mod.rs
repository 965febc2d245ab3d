pub mod abort_reason;
pub mod device_type;
pub mod logical_address;
pub mod opcode;
pub mod physical_address;
pub mod power_status;
pub mod vendor_id;

pub use abort_reason::AbortReason;
pub use device_type::DeviceType;
pub use logical_address::LogicalAddress;
pub use opcode::Opcode;
pub use physical_address::PhysicalAddress;
pub use power_status::PowerStatus;
pub use vendor_id::VendorId;
