pub mod health;
pub mod pool;
pub mod types;
pub mod wrapper;

pub use health::convert_bacnet_health_value;
pub use pool::{BalancerStrategy, ReaderPool};
pub use types::{available_device_properties, BacnetObjectType, PointRequest};
pub use wrapper::{ReaderWrapper, SharedWrapper, DEFAULT_WRITE_PRIORITY};
