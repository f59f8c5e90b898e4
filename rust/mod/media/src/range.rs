//! `Range` header parsing against a known resource size.
//!
//! Only single `bytes=` ranges are served. A comma-separated list is
//! answered with 416 rather than falling back to the full resource.

use audiorelay_core::ServiceError;

/// A satisfiable byte interval, `0 <= start <= end < total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl RangeSpec {
    /// Number of bytes in the interval (inclusive on both ends).
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for a `Content-Range` response header.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }

    /// Value for a `Range` request header sent upstream.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// What a request asked for once its `Range` header has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeRange {
    /// No `Range` header: the whole resource, answered with 200.
    Full { total: u64 },
    /// A single satisfiable range, answered with 206.
    Partial(RangeSpec),
}

impl ServeRange {
    /// Bytes the response body will carry.
    pub fn content_length(&self) -> u64 {
        match self {
            ServeRange::Full { total } => *total,
            ServeRange::Partial(spec) => spec.len(),
        }
    }

    pub fn total(&self) -> u64 {
        match self {
            ServeRange::Full { total } => *total,
            ServeRange::Partial(spec) => spec.total,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, ServeRange::Partial(_))
    }

    /// The interval as a `RangeSpec`; `None` only for a full zero-byte resource.
    pub fn as_spec(&self) -> Option<RangeSpec> {
        match *self {
            ServeRange::Partial(spec) => Some(spec),
            ServeRange::Full { total: 0 } => None,
            ServeRange::Full { total } => Some(RangeSpec { start: 0, end: total - 1, total }),
        }
    }
}

/// Resolve an optional `Range` header against a resource of `total` bytes.
///
/// Malformed syntax is `BadRequest`; syntactically valid ranges that cannot
/// be served (start past the end, inverted bounds, multiple ranges, empty
/// suffix) are `RangeNotSatisfiable`. An `end` past the resource is clamped.
pub fn parse_range(header: Option<&str>, total: u64) -> Result<ServeRange, ServiceError> {
    let Some(raw) = header else {
        return Ok(ServeRange::Full { total });
    };

    let unsatisfiable = |reason: &str| ServiceError::RangeNotSatisfiable {
        total,
        reason: format!("{} in {:?}", reason, raw),
    };
    let malformed = || ServiceError::BadRequest(format!("malformed Range header {:?}", raw));

    let spec = raw
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(malformed)?
        .trim();

    if spec.contains(',') {
        return Err(unsatisfiable("multiple ranges"));
    }

    let (start_str, end_str) = spec.split_once('-').ok_or_else(malformed)?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());
    let parse = |s: &str| -> Result<u64, ServiceError> {
        if s.bytes().all(|b| b.is_ascii_digit()) {
            s.parse::<u64>().map_err(|_| malformed())
        } else {
            Err(malformed())
        }
    };

    let (start, end) = match (start_str.is_empty(), end_str.is_empty()) {
        (true, true) => return Err(malformed()),
        // Suffix form: the last N bytes.
        (true, false) => {
            let suffix = parse(end_str)?;
            if suffix == 0 || total == 0 {
                return Err(unsatisfiable("empty suffix range"));
            }
            (total.saturating_sub(suffix), total - 1)
        }
        (false, true) => {
            let start = parse(start_str)?;
            if start >= total {
                return Err(unsatisfiable("start beyond end of resource"));
            }
            (start, total - 1)
        }
        (false, false) => {
            let start = parse(start_str)?;
            let end = parse(end_str)?;
            if start >= total {
                return Err(unsatisfiable("start beyond end of resource"));
            }
            (start, end.min(total - 1))
        }
    };

    if start > end {
        return Err(unsatisfiable("start after end"));
    }

    Ok(ServeRange::Partial(RangeSpec { start, end, total }))
}
