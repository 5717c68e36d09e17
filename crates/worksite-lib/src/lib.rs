pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::WorksiteOptions;
pub use config::PlatformFamily;

pub mod index;
pub use index::ProjectIndex;
pub use index::Project;

pub mod closure;
pub use closure::ClosureEngine;
pub use closure::Strategy;

pub mod scheduler;
pub use scheduler::RunContext;

pub mod version;
pub mod shell;
pub mod fetch;
pub mod locator;
pub mod repository;
pub mod installer;
pub mod selection;
pub mod step;
pub mod graph;
