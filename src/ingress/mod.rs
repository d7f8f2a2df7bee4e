//! Event ingress: wire frames in, typed events out.
//!
//! The transport (UDP datagrams, one ASCII frame each) lives in the binary;
//! this module owns the frame grammar, instrument classification, and the
//! normalizer that turns frames into `EngineEvent`s while maintaining the
//! per-symbol last-price cache.

mod frame;
mod normalizer;

pub use frame::{dotnet_ticks_to_unix_ms, Frame};
pub use normalizer::{IngressHealth, IngressNormalizer};

/// Role of a feed symbol in the strategy.
///
/// Raw venue symbols carry contract months (`ESZ5`, `MNQH6`, `BTCUSD`), so
/// classification is by substring, the way the upstream feed names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    /// Lead instrument (ES) — the one being traded.
    Es,
    /// NASDAQ-100 correlator.
    Nq,
    /// Dow correlator.
    Ym,
    /// Risk-regime proxy.
    Btc,
    /// Anything else on the feed; ignored.
    Other,
}

impl Instrument {
    /// Classify a raw feed symbol.
    pub fn classify(symbol: &str) -> Instrument {
        let upper = symbol.to_ascii_uppercase();
        if upper.starts_with("BTC") {
            Instrument::Btc
        } else if upper.contains("NQ") {
            Instrument::Nq
        } else if upper.contains("YM") {
            Instrument::Ym
        } else if upper.contains("ES") {
            Instrument::Es
        } else {
            Instrument::Other
        }
    }

    pub(crate) fn cache_index(&self) -> Option<usize> {
        match self {
            Instrument::Es => Some(0),
            Instrument::Nq => Some(1),
            Instrument::Ym => Some(2),
            Instrument::Btc => Some(3),
            Instrument::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_contract_symbols() {
        assert_eq!(Instrument::classify("ESZ5"), Instrument::Es);
        assert_eq!(Instrument::classify("MES"), Instrument::Es);
        assert_eq!(Instrument::classify("NQH6"), Instrument::Nq);
        assert_eq!(Instrument::classify("MNQ"), Instrument::Nq);
        assert_eq!(Instrument::classify("MYM"), Instrument::Ym);
        assert_eq!(Instrument::classify("BTCUSD"), Instrument::Btc);
        assert_eq!(Instrument::classify("CL"), Instrument::Other);
    }

    #[test]
    fn test_nq_takes_priority_over_es_fragment() {
        // "NQ" must not be misread through any overlapping fragment.
        assert_eq!(Instrument::classify("nqz5"), Instrument::Nq);
    }
}
