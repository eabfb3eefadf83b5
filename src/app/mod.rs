pub mod completion;
pub mod data_io;
pub mod enrich;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod recommend;
pub mod runtime;
pub mod types;
pub mod walk;

pub use runtime::run;
