pub mod api;

pub use api::{
    AuthReport, EnrollReport, FailureReason, IrisService, RemoveReport, StatusReport,
};
