//! Datagram transport for compressed units.
//!
//! Units are placed directly into datagrams with no framing header. A unit
//! larger than the configured datagram limit is either split into consecutive
//! raw chunks (an Annex B receiver concatenates them back into the byte
//! stream) or dropped, per `OversizePolicy`.

mod memory;
mod udp;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::str::FromStr;

pub use memory::MemorySink;
pub use udp::UdpSink;

/// Largest payload a UDP/IPv4 datagram can carry.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Default datagram limit, sized to stay under a typical Ethernet MTU.
pub const DEFAULT_MAX_DATAGRAM: usize = 1400;

/// Connectionless, best-effort datagram sink to one fixed destination.
pub trait TransportSink: Send {
    /// Send one datagram. No retry, no acknowledgment.
    fn send(&mut self, datagram: &[u8]) -> Result<()>;
}

impl<S: TransportSink + ?Sized> TransportSink for Box<S> {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        (**self).send(datagram)
    }
}

/// What to do with a unit larger than the datagram limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    #[default]
    Split,
    Drop,
}

impl FromStr for OversizePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "split" => Ok(Self::Split),
            "drop" => Ok(Self::Drop),
            other => Err(anyhow!("unknown oversize policy '{}'", other)),
        }
    }
}

/// Outcome of transmitting one unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransmitOutcome {
    pub datagrams_sent: u64,
    pub send_failures: u64,
    pub dropped_oversize: bool,
}

/// Applies the datagram limit and forwards chunks to a sink.
pub struct Transmitter<S> {
    sink: S,
    max_datagram: usize,
    policy: OversizePolicy,
}

impl<S: TransportSink> Transmitter<S> {
    pub fn new(sink: S, max_datagram: usize, policy: OversizePolicy) -> Result<Self> {
        if max_datagram == 0 || max_datagram > MAX_UDP_PAYLOAD {
            return Err(anyhow!(
                "max datagram size must be within 1..={}, got {}",
                MAX_UDP_PAYLOAD,
                max_datagram
            ));
        }
        Ok(Self {
            sink,
            max_datagram,
            policy,
        })
    }

    /// Send `unit` as one or more datagrams. Failures are reported, never retried.
    pub fn transmit(&mut self, unit: &[u8]) -> TransmitOutcome {
        let mut outcome = TransmitOutcome::default();
        if unit.is_empty() {
            return outcome;
        }
        if unit.len() > self.max_datagram && self.policy == OversizePolicy::Drop {
            log::debug!(
                "Transmitter: dropping {} byte unit (limit {})",
                unit.len(),
                self.max_datagram
            );
            outcome.dropped_oversize = true;
            return outcome;
        }

        for chunk in unit.chunks(self.max_datagram) {
            match self.sink.send(chunk) {
                Ok(()) => outcome.datagrams_sent += 1,
                Err(err) => {
                    log::debug!("Transmitter: send failed: {:#}", err);
                    outcome.send_failures += 1;
                }
            }
        }
        outcome
    }

    pub fn max_datagram(&self) -> usize {
        self.max_datagram
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl TransportSink for FailingSink {
        fn send(&mut self, _datagram: &[u8]) -> Result<()> {
            Err(anyhow!("network unreachable"))
        }
    }

    #[test]
    fn small_unit_is_one_datagram() -> Result<()> {
        let mut tx = Transmitter::new(MemorySink::new(), 8, OversizePolicy::Split)?;
        let outcome = tx.transmit(b"abc");
        assert_eq!(outcome.datagrams_sent, 1);
        assert_eq!(tx.sink().datagrams(), vec![b"abc".to_vec()]);
        Ok(())
    }

    #[test]
    fn split_respects_limit_and_order() -> Result<()> {
        let mut tx = Transmitter::new(MemorySink::new(), 4, OversizePolicy::Split)?;
        let unit: Vec<u8> = (0..10).collect();
        let outcome = tx.transmit(&unit);
        assert_eq!(outcome.datagrams_sent, 3);

        let datagrams = tx.sink().datagrams();
        assert!(datagrams.iter().all(|d| d.len() <= 4));
        assert_eq!(datagrams.concat(), unit);
        Ok(())
    }

    #[test]
    fn drop_policy_sends_nothing_for_oversized_units() -> Result<()> {
        let mut tx = Transmitter::new(MemorySink::new(), 4, OversizePolicy::Drop)?;
        let outcome = tx.transmit(&[0u8; 5]);
        assert!(outcome.dropped_oversize);
        assert_eq!(outcome.datagrams_sent, 0);
        assert!(tx.sink().datagrams().is_empty());

        assert_eq!(tx.transmit(&[0u8; 4]).datagrams_sent, 1);
        Ok(())
    }

    #[test]
    fn failures_are_counted_not_retried() -> Result<()> {
        let mut tx = Transmitter::new(FailingSink, 2, OversizePolicy::Split)?;
        let outcome = tx.transmit(&[1, 2, 3]);
        assert_eq!(outcome.send_failures, 2);
        assert_eq!(outcome.datagrams_sent, 0);
        Ok(())
    }

    #[test]
    fn limit_must_fit_udp() {
        assert!(Transmitter::new(MemorySink::new(), 0, OversizePolicy::Split).is_err());
        assert!(Transmitter::new(MemorySink::new(), 70_000, OversizePolicy::Split).is_err());
    }

    #[test]
    fn policy_parses_case_insensitively() -> Result<()> {
        assert_eq!("Split".parse::<OversizePolicy>()?, OversizePolicy::Split);
        assert_eq!("drop".parse::<OversizePolicy>()?, OversizePolicy::Drop);
        assert!("fragment".parse::<OversizePolicy>().is_err());
        Ok(())
    }
}
