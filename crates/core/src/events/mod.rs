pub mod metadata;
pub mod record;

pub use metadata::*;
pub use record::*;
