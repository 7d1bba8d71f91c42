pub mod error;
pub mod stats;
pub mod trade;
pub mod traits;
pub mod types;

pub use error::*;
pub use trade::*;
pub use traits::*;
pub use types::*;
