pub mod ids;
pub mod ladder;
pub mod link;
pub mod settings;

pub use ids::*;
pub use ladder::*;
pub use link::*;
pub use settings::*;
