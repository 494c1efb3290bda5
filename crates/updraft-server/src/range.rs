//! `Range` request header handling for single byte ranges.
//!
//! Multi-range and malformed headers are ignored (the whole file is served),
//! which RFC 9110 permits. A well-formed range that starts at or past the
//! end of the file is unsatisfiable.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    Full,
    /// Inclusive bounds, already clamped to the file.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

impl ByteRange {
    pub fn resolve(header: Option<&str>, len: u64) -> Self {
        let Some(spec) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
            return ByteRange::Full;
        };
        if spec.contains(',') {
            return ByteRange::Full;
        }
        let Some((first, last)) = spec.trim().split_once('-') else {
            return ByteRange::Full;
        };

        match (first.trim(), last.trim()) {
            // bytes=-N: the final N bytes
            ("", suffix) => match suffix.parse::<u64>() {
                Ok(0) => ByteRange::Unsatisfiable,
                Ok(_) if len == 0 => ByteRange::Unsatisfiable,
                Ok(n) => ByteRange::Partial {
                    start: len.saturating_sub(n),
                    end: len - 1,
                },
                Err(_) => ByteRange::Full,
            },
            (start, end) => {
                let Ok(start) = start.parse::<u64>() else {
                    return ByteRange::Full;
                };
                let end = if end.is_empty() {
                    None
                } else {
                    match end.parse::<u64>() {
                        Ok(e) if e >= start => Some(e),
                        _ => return ByteRange::Full,
                    }
                };
                if start >= len {
                    return ByteRange::Unsatisfiable;
                }
                ByteRange::Partial {
                    start,
                    end: end.map_or(len - 1, |e| e.min(len - 1)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_header_is_full() {
        assert_eq!(ByteRange::resolve(None, 10), ByteRange::Full);
    }

    #[test]
    fn open_ended_range() {
        assert_eq!(
            ByteRange::resolve(Some("bytes=4-"), 10),
            ByteRange::Partial { start: 4, end: 9 }
        );
    }

    #[test]
    fn closed_range_is_clamped() {
        assert_eq!(
            ByteRange::resolve(Some("bytes=2-99"), 10),
            ByteRange::Partial { start: 2, end: 9 }
        );
    }

    #[test]
    fn suffix_range() {
        assert_eq!(
            ByteRange::resolve(Some("bytes=-3"), 10),
            ByteRange::Partial { start: 7, end: 9 }
        );
        assert_eq!(
            ByteRange::resolve(Some("bytes=-30"), 10),
            ByteRange::Partial { start: 0, end: 9 }
        );
    }

    #[test]
    fn range_past_end_is_unsatisfiable() {
        assert_eq!(
            ByteRange::resolve(Some("bytes=10-14"), 10),
            ByteRange::Unsatisfiable
        );
        assert_eq!(
            ByteRange::resolve(Some("bytes=0-"), 0),
            ByteRange::Unsatisfiable
        );
    }

    #[test]
    fn malformed_and_multi_ranges_are_ignored() {
        for h in ["bytes=a-b", "items=0-1", "bytes=5-2", "bytes=0-1,4-5", "bytes=3"] {
            assert_eq!(ByteRange::resolve(Some(h), 10), ByteRange::Full, "{h}");
        }
    }
}
