mod trace_log;

pub use trace_log::{TraceLog, TraceRecord};
