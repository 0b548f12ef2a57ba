//! Error Taxonomy and Error Router: the tagged error value shared by every
//! subsystem, and the kind-keyed dispatcher that handles it.

mod router;
mod taxonomy;

pub use router::{
    Environment, ErrorContext, ErrorRouter, FrameworkIntegration, ProblemIntegration,
    ERROR_RING_CAPACITY,
};
pub use taxonomy::{ErrorKind, FrameworkError};
