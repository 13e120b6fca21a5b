pub mod cli;
pub mod read;
pub mod wait;

pub use cli::*;
pub use read::*;
pub use wait::*;
