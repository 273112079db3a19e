//! Built-in probe implementations.
//!
//! Only DNS ships with the crate; the browser-bound probes (technology,
//! accessibility, performance) are external engines wired in through the
//! [`Probe`](crate::probe::Probe) trait.

pub mod dns;

pub use dns::DnsLookupProbe;
