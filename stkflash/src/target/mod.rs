//! Target device knowledge: part table and device identification.

pub mod info;
pub mod part;

pub use info::DeviceInfo;
pub use part::{Part, TARGET_PAGE_SIZE};
