pub mod cache;
pub mod command;
pub mod error;
pub mod local;
pub mod normalize;
pub mod router;
pub mod vendor;

pub use cache::PayloadCache;
pub use command::CommandVendor;
pub use error::VendorError;
pub use local::LocalVendor;
pub use router::{validate_ticker, DataVendorRouter};
pub use vendor::DataVendor;
