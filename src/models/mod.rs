pub mod assessment;
pub mod enums;
pub mod target;

pub use assessment::*;
pub use enums::*;
pub use target::*;
