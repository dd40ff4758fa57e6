//! Hard caps on inventory size and request shape. Breaches surface as
//! `EngineError::LimitExceeded`.

pub const MAX_HOTELS: usize = 10_000;
pub const MAX_ROOM_TYPES_PER_HOTEL: usize = 256;
pub const MAX_ROOMS_PER_TYPE: usize = 2_048;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TEXT_LEN: usize = 4_096;
pub const MAX_ROOM_NUMBER_LEN: usize = 32;

pub const MIN_CURRENCY_LEN: usize = 3;
pub const MAX_CURRENCY_LEN: usize = 8;

pub const MAX_ROOM_CAPACITY: u32 = 64;

/// Longest single stay.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Widest window an availability query may span.
pub const MAX_QUERY_NIGHTS: i64 = 366;

/// Widest occupancy report period.
pub const MAX_REPORT_NIGHTS: i64 = 3_660;
