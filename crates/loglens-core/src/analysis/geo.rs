use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use super::tops::{CountEntry, ranked_entries};

/// Coarse per-bucket geographic roll-up. No real geolocation backend:
/// country and region labels stay `"unknown"` for public addresses, but
/// bucket totals always sum to the request total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoSummary {
    pub local_requests: u64,
    pub cloud_requests: u64,
    pub unknown_requests: u64,
    pub countries: Vec<CountEntry>,
    pub regions: Vec<CountEntry>,
}

/// Well-known cloud provider ranges. Ships empty pending a curated table;
/// with no entries, no IP classifies as `cloud`.
const CLOUD_RANGES: [Cidr; 0] = [];

#[derive(Debug, Clone, Copy)]
pub(crate) struct Cidr {
    pub network: IpAddr,
    pub prefix: u8,
}

impl Cidr {
    pub(crate) fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let bits = 32 - u32::from(self.prefix.min(32));
                bits >= 32 || (u32::from(net) >> bits) == (u32::from(ip) >> bits)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let bits = 128 - u32::from(self.prefix.min(128));
                bits >= 128 || (u128::from(net) >> bits) == (u128::from(ip) >> bits)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GeoBucket {
    Local,
    Cloud,
    Unknown,
}

pub(crate) fn classify_ip(ip: IpAddr) -> GeoBucket {
    if is_local(ip) {
        return GeoBucket::Local;
    }
    if CLOUD_RANGES.iter().any(|range| range.contains(ip)) {
        return GeoBucket::Cloud;
    }
    GeoBucket::Unknown
}

fn is_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        // Unique-local (fc00::/7) is the closest v6 analogue of RFC1918.
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[derive(Debug, Default)]
pub(crate) struct GeoStats {
    pub local: u64,
    pub cloud: u64,
    pub unknown: u64,
    pub countries: HashMap<String, u64>,
    pub regions: HashMap<String, u64>,
}

impl GeoStats {
    pub(crate) fn add(&mut self, ip: IpAddr) {
        let (country, region) = match classify_ip(ip) {
            GeoBucket::Local => {
                self.local += 1;
                ("local", "local")
            }
            GeoBucket::Cloud => {
                self.cloud += 1;
                ("cloud", "cloud")
            }
            GeoBucket::Unknown => {
                self.unknown += 1;
                ("unknown", "unknown")
            }
        };
        *self.countries.entry(country.to_string()).or_insert(0) += 1;
        *self.regions.entry(region.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn finish(self, total: u64) -> GeoSummary {
        GeoSummary {
            local_requests: self.local,
            cloud_requests: self.cloud,
            unknown_requests: self.unknown,
            countries: ranked_entries(self.countries, total),
            regions: ranked_entries(self.regions, total),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::{Cidr, GeoBucket, GeoStats, classify_ip};

    fn ip(text: &str) -> IpAddr {
        text.parse().expect("ip")
    }

    #[test]
    fn rfc1918_and_loopback_are_local() {
        assert_eq!(classify_ip(ip("10.1.2.3")), GeoBucket::Local);
        assert_eq!(classify_ip(ip("172.16.0.1")), GeoBucket::Local);
        assert_eq!(classify_ip(ip("192.168.1.1")), GeoBucket::Local);
        assert_eq!(classify_ip(ip("127.0.0.1")), GeoBucket::Local);
        assert_eq!(classify_ip(ip("::1")), GeoBucket::Local);
        assert_eq!(classify_ip(ip("fd12:3456::1")), GeoBucket::Local);
    }

    #[test]
    fn public_addresses_are_unknown_without_a_cloud_table() {
        assert_eq!(classify_ip(ip("8.8.8.8")), GeoBucket::Unknown);
        assert_eq!(classify_ip(ip("2001:db8::1")), GeoBucket::Unknown);
    }

    #[test]
    fn cidr_matching_honours_prefix_length() {
        let range = Cidr {
            network: ip("52.0.0.0"),
            prefix: 8,
        };
        assert!(range.contains(ip("52.12.34.56")));
        assert!(!range.contains(ip("53.0.0.1")));
        assert!(!range.contains(ip("2001:db8::1")));
    }

    #[test]
    fn bucket_totals_stay_consistent() {
        let mut stats = GeoStats::default();
        for addr in ["10.0.0.1", "10.0.0.1", "8.8.8.8"] {
            stats.add(ip(addr));
        }
        let summary = stats.finish(3);
        assert_eq!(
            summary.local_requests + summary.cloud_requests + summary.unknown_requests,
            3
        );
        assert_eq!(summary.countries[0].key, "local");
        assert_eq!(summary.countries[0].count, 2);
    }
}
