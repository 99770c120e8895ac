pub mod content;
pub mod generation;
pub mod stream;

pub use content::*;
pub use generation::*;
pub use stream::*;
