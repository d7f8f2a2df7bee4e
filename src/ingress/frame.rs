//! ASCII wire-frame grammar.
//!
//! One frame per datagram (or newline), comma-separated, `.` decimal point:
//!
//! | Type | Format |
//! |------|--------|
//! | Trade | `T,<symbol>,<price>,<volume>,<side>[,<exch_ticks>]` |
//! | Depth | `D,<symbol>,<bids>,<asks>[,<exch_ticks>]` |
//! | Heartbeat | `H,<symbol>,<ticks>` |
//! | Position | `P,<symbol>,<signed_volume>` |
//! | Monitored limit | `M,<symbol>,<price>` |
//!
//! Depth level groups are `p1@v1|p2@v2|…`, bids descending and asks
//! ascending; `0@0` denotes an absent level. `exch_ticks` is the venue
//! clock, a .NET 100 ns tick counter.

use crate::errors::FrameError;
use crate::types::{AggressorSide, BookLevels};

/// .NET ticks at the unix epoch (ticks count from 0001-01-01).
const DOTNET_TICKS_AT_UNIX_EPOCH: u64 = 621_355_968_000_000_000;

/// Convert a venue .NET 100 ns tick counter to unix milliseconds.
pub fn dotnet_ticks_to_unix_ms(ticks: u64) -> u64 {
    ticks.saturating_sub(DOTNET_TICKS_AT_UNIX_EPOCH) / 10_000
}

/// A parsed wire frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Trade {
        symbol: String,
        price: f64,
        volume: f64,
        side: AggressorSide,
        exch_ticks: Option<u64>,
    },
    Depth {
        symbol: String,
        bids: BookLevels,
        asks: BookLevels,
        exch_ticks: Option<u64>,
    },
    Heartbeat {
        symbol: String,
        ticks: u64,
    },
    Position {
        symbol: String,
        signed_volume: f64,
    },
    /// Venue-observed active limit price; 0 means no active limit.
    MonitoredLimit {
        symbol: String,
        price: f64,
    },
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, FrameError> {
    value.parse().map_err(|_| FrameError::BadNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, FrameError> {
    value.parse().map_err(|_| FrameError::BadNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_levels(raw: &str) -> Result<BookLevels, FrameError> {
    let mut levels = BookLevels::new();
    for item in raw.split('|') {
        if item == "0@0" {
            continue;
        }
        let (p, v) = item
            .split_once('@')
            .ok_or_else(|| FrameError::BadLevel(item.to_string()))?;
        let price: f64 = p
            .parse()
            .map_err(|_| FrameError::BadLevel(item.to_string()))?;
        let size: f64 = v
            .parse()
            .map_err(|_| FrameError::BadLevel(item.to_string()))?;
        if price > 0.0 && size > 0.0 {
            levels.push((price, size));
        }
    }
    Ok(levels)
}

fn encode_levels(levels: &[(f64, f64)]) -> String {
    if levels.is_empty() {
        return "0@0".to_string();
    }
    levels
        .iter()
        .map(|(p, v)| format!("{p}@{v}"))
        .collect::<Vec<_>>()
        .join("|")
}

impl Frame {
    /// Parse one frame. Trailing newline is tolerated.
    pub fn parse(line: &str) -> Result<Frame, FrameError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(FrameError::Empty);
        }
        let parts: Vec<&str> = line.split(',').collect();

        match parts[0] {
            "T" => {
                if parts.len() < 5 {
                    return Err(FrameError::MissingField("trade fields"));
                }
                let side = AggressorSide::parse(parts[4])
                    .ok_or_else(|| FrameError::BadSide(parts[4].to_string()))?;
                Ok(Frame::Trade {
                    symbol: parts[1].to_string(),
                    price: parse_f64("price", parts[2])?,
                    volume: parse_f64("volume", parts[3])?,
                    side,
                    exch_ticks: match parts.get(5) {
                        Some(raw) => Some(parse_u64("exch_ticks", raw)?),
                        None => None,
                    },
                })
            }
            "D" => {
                if parts.len() < 4 {
                    return Err(FrameError::MissingField("depth fields"));
                }
                Ok(Frame::Depth {
                    symbol: parts[1].to_string(),
                    bids: parse_levels(parts[2])?,
                    asks: parse_levels(parts[3])?,
                    exch_ticks: match parts.get(4) {
                        Some(raw) => Some(parse_u64("exch_ticks", raw)?),
                        None => None,
                    },
                })
            }
            "H" => {
                if parts.len() < 3 {
                    return Err(FrameError::MissingField("heartbeat ticks"));
                }
                Ok(Frame::Heartbeat {
                    symbol: parts[1].to_string(),
                    ticks: parse_u64("ticks", parts[2])?,
                })
            }
            "P" => {
                if parts.len() < 3 {
                    return Err(FrameError::MissingField("position volume"));
                }
                Ok(Frame::Position {
                    symbol: parts[1].to_string(),
                    signed_volume: parse_f64("signed_volume", parts[2])?,
                })
            }
            "M" => {
                if parts.len() < 3 {
                    return Err(FrameError::MissingField("monitored price"));
                }
                Ok(Frame::MonitoredLimit {
                    symbol: parts[1].to_string(),
                    price: parse_f64("price", parts[2])?,
                })
            }
            other => Err(FrameError::UnknownType(other.to_string())),
        }
    }

    /// Encode back to the wire form. Parsing an encoded frame yields an
    /// equal frame, and canonical frames round-trip byte-identically.
    pub fn encode(&self) -> String {
        match self {
            Frame::Trade {
                symbol,
                price,
                volume,
                side,
                exch_ticks,
            } => {
                let mut out = format!("T,{symbol},{price},{volume},{}", side.wire());
                if let Some(ticks) = exch_ticks {
                    out.push_str(&format!(",{ticks}"));
                }
                out
            }
            Frame::Depth {
                symbol,
                bids,
                asks,
                exch_ticks,
            } => {
                let mut out = format!(
                    "D,{symbol},{},{}",
                    encode_levels(bids),
                    encode_levels(asks)
                );
                if let Some(ticks) = exch_ticks {
                    out.push_str(&format!(",{ticks}"));
                }
                out
            }
            Frame::Heartbeat { symbol, ticks } => format!("H,{symbol},{ticks}"),
            Frame::Position {
                symbol,
                signed_volume,
            } => format!("P,{symbol},{signed_volume}"),
            Frame::MonitoredLimit { symbol, price } => format!("M,{symbol},{price}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_round_trip() {
        let raw = "T,ESZ5,6800.25,12,BUY,638500000000000000";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.encode(), raw);
        match frame {
            Frame::Trade {
                price,
                volume,
                side,
                exch_ticks,
                ..
            } => {
                assert_eq!(price, 6800.25);
                assert_eq!(volume, 12.0);
                assert_eq!(side, AggressorSide::Buy);
                assert_eq!(exch_ticks, Some(638_500_000_000_000_000));
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn test_trade_without_venue_clock() {
        let raw = "T,NQH6,21500.5,3,SELL";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.encode(), raw);
    }

    #[test]
    fn test_depth_round_trip() {
        let raw = "D,ESZ5,6800@40|6799.75@25,6800.25@30|6800.5@55";
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.encode(), raw);
        match &frame {
            Frame::Depth { bids, asks, .. } => {
                assert_eq!(bids.as_slice(), &[(6800.0, 40.0), (6799.75, 25.0)]);
                assert_eq!(asks.as_slice(), &[(6800.25, 30.0), (6800.5, 55.0)]);
            }
            other => panic!("expected depth, got {other:?}"),
        }
    }

    #[test]
    fn test_depth_placeholder_levels_dropped() {
        let frame = Frame::parse("D,ESZ5,6800@40|0@0|0@0,0@0").unwrap();
        match frame {
            Frame::Depth { bids, asks, .. } => {
                assert_eq!(bids.len(), 1);
                assert!(asks.is_empty());
            }
            other => panic!("expected depth, got {other:?}"),
        }
    }

    #[test]
    fn test_heartbeat_position_monitor_round_trip() {
        for raw in ["H,ESZ5,638500000000000000", "P,ESZ5,-2", "M,ESZ5,6799.5"] {
            let frame = Frame::parse(raw).unwrap();
            assert_eq!(frame.encode(), raw);
        }
    }

    #[test]
    fn test_monitored_zero_means_no_limit() {
        match Frame::parse("M,ESZ5,0").unwrap() {
            Frame::MonitoredLimit { price, .. } => assert_eq!(price, 0.0),
            other => panic!("expected monitored limit, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert_eq!(Frame::parse(""), Err(FrameError::Empty));
        assert!(matches!(
            Frame::parse("X,ESZ5,1"),
            Err(FrameError::UnknownType(_))
        ));
        assert!(matches!(
            Frame::parse("T,ESZ5,6800.25"),
            Err(FrameError::MissingField(_))
        ));
        assert!(matches!(
            Frame::parse("T,ESZ5,abc,12,BUY"),
            Err(FrameError::BadNumber { .. })
        ));
        assert!(matches!(
            Frame::parse("T,ESZ5,6800.25,12,UP"),
            Err(FrameError::BadSide(_))
        ));
        assert!(matches!(
            Frame::parse("D,ESZ5,6800?40,0@0"),
            Err(FrameError::BadLevel(_))
        ));
    }

    #[test]
    fn test_dotnet_tick_conversion() {
        assert_eq!(dotnet_ticks_to_unix_ms(DOTNET_TICKS_AT_UNIX_EPOCH), 0);
        // One second past the epoch is 10^7 ticks.
        assert_eq!(
            dotnet_ticks_to_unix_ms(DOTNET_TICKS_AT_UNIX_EPOCH + 10_000_000),
            1_000
        );
        // Pre-epoch values saturate instead of wrapping.
        assert_eq!(dotnet_ticks_to_unix_ms(0), 0);
    }
}
