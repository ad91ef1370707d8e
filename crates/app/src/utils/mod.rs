pub mod logging;

pub use logging::{error_label, init_tracing, log_resume_report};
