pub mod enrollment_store;

pub use enrollment_store::EnrollmentStore;
