//! Extra-field chain decoding: zip64 overrides and high-precision
//! timestamps, plus the legacy MS-DOS date/time they compete with.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};

use crate::error::{Result, ZipError};

use super::buf::ReadBuf;
use super::structures::SENTINEL_32;

const ZIP64_EXTRA_ID: u16 = 0x0001;
const NTFS_EXTRA_ID: u16 = 0x000a;
const UNIX_EXTRA_ID: u16 = 0x000d;
const EXT_TIME_EXTRA_ID: u16 = 0x5455;
const INFOZIP_UNIX_EXTRA_ID: u16 = 0x5855;

/// 100ns ticks per second in a Windows FILETIME.
const NTFS_TICKS_PER_SECOND: u64 = 10_000_000;
/// Seconds between 1601-01-01 and 1970-01-01.
const NTFS_EPOCH_DELTA: i64 = 11_644_473_600;

/// Raw 32-bit header fields that may be overridden by a zip64 sub-record.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawSizes {
    pub(crate) compressed: u32,
    pub(crate) uncompressed: u32,
    pub(crate) header_offset: u32,
}

/// Outcome of walking an entry's extra-field chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Resolved {
    pub(crate) compressed: u64,
    pub(crate) uncompressed: u64,
    pub(crate) header_offset: u64,
    pub(crate) modified: Option<DateTime<Utc>>,
}

pub(crate) fn resolve(extra: &[u8], raw: RawSizes) -> Result<Resolved> {
    let mut need_usize = raw.uncompressed == SENTINEL_32;
    let mut need_csize = raw.compressed == SENTINEL_32;
    let mut need_offset = raw.header_offset == SENTINEL_32;

    let mut resolved = Resolved {
        compressed: u64::from(raw.compressed),
        uncompressed: u64::from(raw.uncompressed),
        header_offset: u64::from(raw.header_offset),
        modified: None,
    };

    let mut chain = ReadBuf::new(extra);
    while chain.len() >= 4 {
        let tag = chain.u16()?;
        let size = usize::from(chain.u16()?);
        if size > chain.len() {
            return Err(ZipError::format(format!(
                "extra field {tag:#06x} declares {size} bytes, {} remain",
                chain.len()
            )));
        }
        let mut field = chain.sub(size)?;

        match tag {
            ZIP64_EXTRA_ID => {
                // Only the saturated fields are present, in this order.
                if need_usize {
                    need_usize = false;
                    resolved.uncompressed = zip64_field(&mut field)?;
                }
                if need_csize {
                    need_csize = false;
                    resolved.compressed = zip64_field(&mut field)?;
                }
                if need_offset {
                    need_offset = false;
                    resolved.header_offset = zip64_field(&mut field)?;
                }
            }
            NTFS_EXTRA_ID => {
                if let Some(modified) = ntfs_modified(field) {
                    resolved.modified = Some(modified);
                }
            }
            UNIX_EXTRA_ID | INFOZIP_UNIX_EXTRA_ID => {
                if field.len() < 8 {
                    continue;
                }
                field.skip(4)?; // access time
                if let Some(modified) = DateTime::from_timestamp(i64::from(field.u32()?), 0) {
                    resolved.modified = Some(modified);
                }
            }
            EXT_TIME_EXTRA_ID => {
                if field.len() < 5 || field.u8()? & 1 == 0 {
                    continue;
                }
                if let Some(modified) = DateTime::from_timestamp(i64::from(field.u32()?), 0) {
                    resolved.modified = Some(modified);
                }
            }
            _ => {}
        }
    }

    if need_usize || need_csize || need_offset {
        return Err(ZipError::format(
            "zip64 sentinel without a matching zip64 extra field",
        ));
    }

    Ok(resolved)
}

fn zip64_field(field: &mut ReadBuf<'_>) -> Result<u64> {
    if field.len() < 8 {
        return Err(ZipError::format("zip64 extra field too short"));
    }
    field.u64()
}

/// Modification time from a Windows NTFS block, if it carries one.
fn ntfs_modified(mut field: ReadBuf<'_>) -> Option<DateTime<Utc>> {
    field.skip(4).ok()?; // reserved
    let mut modified = None;
    while field.len() >= 4 {
        let (Ok(attr_tag), Ok(attr_size)) = (field.u16(), field.u16()) else {
            break;
        };
        let Ok(mut attr) = field.sub(usize::from(attr_size)) else {
            break;
        };
        if attr_tag != 1 || attr_size != 24 {
            continue;
        }
        if let Ok(ticks) = attr.u64() {
            let secs = (ticks / NTFS_TICKS_PER_SECOND) as i64 - NTFS_EPOCH_DELTA;
            let nanos = (ticks % NTFS_TICKS_PER_SECOND) as u32 * 100;
            modified = DateTime::from_timestamp(secs, nanos);
        }
    }
    modified
}

/// Decode an MS-DOS date/time pair.
///
/// Out-of-range fields carry into the neighbouring unit, so an all-zero
/// pair becomes 1979-11-30 00:00:00.
pub(crate) fn msdos_to_naive(date: u16, time: u16) -> NaiveDateTime {
    let year = i32::from(date >> 9) + 1980;
    let month = i32::from((date >> 5) & 0x0f);
    let day = i64::from(date & 0x1f);

    let months = year * 12 + month - 1;
    let first = NaiveDate::from_ymd_opt(
        months.div_euclid(12),
        months.rem_euclid(12) as u32 + 1,
        1,
    )
    .unwrap_or(NaiveDate::MIN);

    let seconds = i64::from(time >> 11) * 3600
        + i64::from((time >> 5) & 0x3f) * 60
        + i64::from(time & 0x1f) * 2;

    first.and_time(NaiveTime::MIN) + Duration::days(day - 1) + Duration::seconds(seconds)
}

/// Choose the reported modification instant for an entry.
///
/// A precise timestamp wins. When the legacy fields are also set, their
/// difference from the precise instant is taken as the writer's timezone
/// offset. This is an estimate.
pub(crate) fn modified_instant(
    date: u16,
    time: u16,
    precise: Option<DateTime<Utc>>,
) -> DateTime<FixedOffset> {
    let legacy = msdos_to_naive(date, time).and_utc();
    let Some(precise) = precise else {
        return legacy.fixed_offset();
    };
    if date == 0 && time == 0 {
        return precise.fixed_offset();
    }
    let offset = estimate_offset((legacy - precise).num_seconds());
    precise.with_timezone(&offset)
}

fn estimate_offset(delta_secs: i64) -> FixedOffset {
    const ALIAS: i64 = 15 * 60;
    const MIN_OFFSET: i64 = -12 * 3600;
    const MAX_OFFSET: i64 = 14 * 3600;

    let quarters = if delta_secs >= 0 {
        (delta_secs + ALIAS / 2) / ALIAS
    } else {
        (delta_secs - ALIAS / 2) / ALIAS
    };
    let rounded = quarters * ALIAS;
    let secs = if (MIN_OFFSET..=MAX_OFFSET).contains(&rounded) {
        rounded
    } else {
        0
    };
    FixedOffset::east_opt(secs as i32).unwrap_or_else(|| Utc.fix())
}
