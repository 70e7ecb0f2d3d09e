pub mod auth;
pub mod clicks;
pub mod config;
pub mod ddb;
pub mod error;
pub mod handler;
pub mod model;
pub mod normalize;
pub mod repository;
pub mod resolver;
pub mod scope;
pub mod template;
pub mod util;

pub use error::{ResolveError, Result};
pub use model::{Candidate, Identity, Namespace, ResolutionResult, Shortcut};
pub use resolver::Resolver;
