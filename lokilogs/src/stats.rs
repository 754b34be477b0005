use std::fmt;
use std::time::{Duration, Instant};

/// Counters for the summary line logged at the end of an invocation.
#[derive(Debug, Clone)]
pub struct InvocationStats {
    start: Instant,
    pub records: usize,
    pub entries: usize,
    pub bytes: usize,
    pub streams: usize,
}

impl InvocationStats {

    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            records: 0,
            entries: 0,
            bytes: 0,
            streams: 0,
        }
    }

    pub fn cost(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for InvocationStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} records, {} entries, {} bytes in {} streams, cost: {:#?}",
            self.records, self.entries, self.bytes, self.streams, self.cost())
    }
}
