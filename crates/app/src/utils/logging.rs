use pelagic_core::ResumeReport;
use pelagic_domain::PelagicError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable selecting JSON log lines over the human format.
pub const LOG_FORMAT_ENV: &str = "PELAGIC_LOG_FORMAT";

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` and falls back to `info`. Calling this more
/// than once is harmless; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|value| value.eq_ignore_ascii_case("json"));

    let installed = if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init()
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Convert a `PelagicError` into a stable label suitable for logging.
#[inline]
pub fn error_label(error: &PelagicError) -> &'static str {
    match error {
        PelagicError::UnsupportedBodyKind(_) => "unsupported_body_kind",
        PelagicError::FailedAuthentication(_) => "failed_authentication",
        PelagicError::Transport { status: Some(_), .. } => "transport_status",
        PelagicError::Transport { status: None, .. } => "transport_network",
        PelagicError::NoSuchPage(_) => "no_such_page",
        PelagicError::StoreIo(_) => "store_io",
        PelagicError::Interrupted(_) => "interrupted",
        PelagicError::Decode(_) => "decode",
        PelagicError::Config(_) => "config",
        PelagicError::InvalidInput(_) => "invalid_input",
        PelagicError::Internal(_) => "internal",
    }
}

/// Log the outcome of a resume pass with one line per failed request.
pub fn log_resume_report(report: &ResumeReport) {
    for (id, error) in &report.failed {
        warn!(
            request_id = %id,
            error_type = error_label(error),
            recoverable = error.is_recoverable(),
            error = %error,
            "resumed request failed"
        );
    }

    for record in &report.unreadable {
        warn!(
            key = %record.key,
            error_type = error_label(&record.error),
            error = %record.error,
            "stored request could not be read"
        );
    }

    info!(
        completed = report.completed.len(),
        failed = report.failed.len(),
        skipped = report.skipped.len(),
        discarded = report.discarded.len(),
        unreadable = report.unreadable.len(),
        "resume finished"
    );
}
