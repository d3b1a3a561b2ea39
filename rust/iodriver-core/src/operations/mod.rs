pub mod control;
pub mod objects;
pub mod qos;
pub mod reporting;
pub mod system;

pub use control::RepeatFor;
pub use objects::{CreateBucket, CreateObject, DeleteBucket, CREATE_OBJECT_IO_COST};
pub use qos::{DeriveQos, SetVolumeQos, StatVolume};
pub use reporting::{AddToReporter, ReportStart, ReportStop};
pub use system::{GetTenants, GetUsers, GetVolumes};
