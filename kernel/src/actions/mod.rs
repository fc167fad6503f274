//! Actions from the Delta log that the scan kernel consumes.

pub mod deletion_vector;

pub use deletion_vector::{DeletionVectorDescriptor, DeletionVectorStorageType};
