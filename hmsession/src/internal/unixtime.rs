use time::OffsetDateTime;

//--------------------------------------------------------------------------------------------------
// Unix Timestamp handling
//--------------------------------------------------------------------------------------------------

pub const MILLIS_PER_SECOND: i64 = 1000;

// Claims carry whole seconds, everything else in the session core works in milliseconds. Any
// numeric claim is kept as issued, however far out it lies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnixTimestamp(i64);

impl UnixTimestamp {
    pub fn from_seconds(seconds: i64) -> Self {
        UnixTimestamp(seconds)
    }

    pub fn seconds(self) -> i64 {
        self.0
    }

    pub fn millis(self) -> i64 {
        self.0.saturating_mul(MILLIS_PER_SECOND)
    }
}

//--------------------------------------------------------------------------------------------------

pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    (nanos / 1_000_000) as i64
}

//--------------------------------------------------------------------------------------------------
