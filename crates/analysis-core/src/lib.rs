pub mod error;
pub mod point_in_time;
pub mod stats;
pub mod summary;
pub mod traits;
pub mod types;

pub use error::*;
pub use summary::*;
pub use traits::*;
pub use types::*;
