mod priority;
mod readable;
mod summary;
mod translation;

pub use priority::*;
pub use readable::*;
pub use summary::*;
pub use translation::*;
