pub mod flush;
pub mod timer;

pub use flush::*;
pub use timer::*;
