pub mod field;
pub mod mapping;
pub mod record;
pub mod run;

pub use field::*;
pub use mapping::*;
pub use record::*;
pub use run::*;
