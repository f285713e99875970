pub mod character;
pub mod doc;
pub mod params;
pub mod scope;
pub mod turn;

pub use character::*;
pub use doc::*;
pub use params::*;
pub use scope::*;
pub use turn::*;
