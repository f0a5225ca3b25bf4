mod mode;
mod row;
mod sample;
mod timestamp;

pub use mode::SampleMode;
pub use row::{MetricsRow, RowSettings};
pub use sample::{AssertionOutcome, SampleOutcome};
pub use timestamp::{TimestampFormatError, TimestampFormatter, DEFAULT_TIMESTAMP_FORMAT};
