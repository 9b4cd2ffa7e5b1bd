mod locator;
mod profile;

pub use locator::*;
pub use profile::*;
