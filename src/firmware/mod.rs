pub mod negotiator;
pub mod registry;
pub mod version;

pub use negotiator::{FirmwareCheckResponse, negotiate};
pub use registry::{FirmwareRecord, FirmwareRegistry, FirmwareUpload, RegistryError};
