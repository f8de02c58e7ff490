// Individual source mappings
pub mod bescha;
pub mod ted;

pub use bescha::BeschaMapping;
pub use ted::TedMapping;
