//! Routes ACME HTTP-01 validation traffic to a challenge solver service through Kubernetes
//! ingresses, either by creating dedicated ingresses or by patching an existing one.

pub mod certificate;
pub mod common;
pub mod configuration;
pub mod labels;
pub mod path;
pub mod retry;
pub mod solver;
pub mod store;

pub use certificate::Certificate;
pub use configuration::{ConfigurationError, SolverConfiguration};
pub use solver::{AggregateError, IngressSolver, SolverError};
pub use store::{InMemoryIngressStore, IngressStore, KubeIngressStore, StoreError};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;
