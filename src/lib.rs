#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod artifact;
pub mod config;
pub mod content;
pub mod corpus;
pub mod observability;
pub mod popularity;
pub mod recommend;
pub mod util;

pub use artifact::{ArtifactError, ArtifactSource, BytesSource, LocalFileSource};
pub use corpus::{Article, Corpus, PrepareError, User};
pub use recommend::{
    PrepareOptions, QueryError, Recommendation, Served, ServingMode, Snapshot, SnapshotHandle,
};
