/// Controls how much per-sample detail is included in the emitted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SampleMode {
    /// Always include request/response details.
    #[display("debug")]
    Debug,
    /// Include request/response details only for failed samples.
    #[display("info")]
    Info,
    /// Emit failed samples only, always with details.
    #[display("error")]
    Error,
    /// Never include request/response details.
    #[display("quiet")]
    Quiet,
}

impl SampleMode {
    /// Parse the configured mode, case-insensitively on trimmed input.
    ///
    /// An unrecognized value is not fatal: a warning is logged and the listener keeps
    /// running without emitting any request/response detail, the same as `quiet`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "debug" => Self::Debug,
            "info" => Self::Info,
            "error" => Self::Error,
            "quiet" => Self::Quiet,
            other => {
                log::warn!(
                    "Unrecognized test mode {other:?}; allowed modes are debug, info, error \
                     and quiet. Request and response details will not be emitted."
                );
                Self::Quiet
            }
        }
    }

    /// Whether request/response detail fields belong in the document for a sample with
    /// the given success flag.
    pub fn includes_details(&self, success: bool) -> bool {
        match self {
            Self::Debug | Self::Error => true,
            Self::Info => !success,
            Self::Quiet => false,
        }
    }
}
