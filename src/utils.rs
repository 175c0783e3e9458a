//! Identifier minting and timestamp primitives
use crate::error::SwapError;
use bech32::Bech32m;
use chrono::{DateTime, TimeZone, Utc};
use uuid7::uuid7;

/// Prefix for user entity ids.
pub const USER_ID_PREFIX: &str = "user_";
/// Prefix for swap request entity ids.
pub const SWAP_ID_PREFIX: &str = "swap_";

// mint a unique id then encode using bech32 under a readable prefix,
// e.g. "user_1..." or "swap_1...". The prefix doubles as the key-space
// discriminator in the store.
pub fn new_prefixed_id(prefix: &str) -> Result<String, SwapError> {
    let hrp = bech32::Hrp::parse(prefix)
        .map_err(|e| SwapError::Validation(format!("invalid id prefix {prefix:?}: {e}")))?;
    let encoded = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| SwapError::Validation(format!("id encoding failed: {e}")))?;
    Ok(encoded)
}

#[derive(Debug, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// Manual impls instead of derives: deriving would require `T: Eq + Ord`, but
// `DateTime<T>` is already totally ordered for any `TimeZone`.
impl<T: TimeZone> PartialEq for TimeStamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: TimeZone> Eq for TimeStamp<T> {}

impl<T: TimeZone> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}
