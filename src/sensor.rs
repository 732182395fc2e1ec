mod normalize;
mod payload;
mod reading;

pub use normalize::*;
pub use payload::*;
pub use reading::*;
