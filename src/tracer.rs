/// Install the process-wide JSON log subscriber. Safe to call more than
/// once; later calls fail and are ignored by callers.
pub fn setup_simple_tracing() -> core::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().json().with_target(false).try_init()
}
