pub mod audit;
pub mod chemical;
pub mod enums;
pub mod extraction;
pub mod notification;
pub mod review;
pub mod sync_run;
pub mod tenant;

pub use audit::*;
pub use chemical::*;
pub use extraction::*;
pub use notification::*;
pub use review::*;
pub use sync_run::*;
pub use tenant::*;
