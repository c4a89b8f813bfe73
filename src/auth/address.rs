//! Source-address filtering: exact, wildcard (`*` anywhere), and CIDR
//! patterns. Deny rules are evaluated before allow rules.

use regex::Regex;
use std::net::IpAddr;

/// Whether `address` matches one pattern. CIDR patterns apply only when the
/// address parses as an IP; textual patterns compare the raw string, with
/// `*` standing for any run of characters.
#[must_use]
pub fn address_matches(pattern: &str, address: &str) -> bool {
    if let Some((network, prefix)) = pattern.split_once('/') {
        if let (Ok(network), Ok(prefix), Ok(addr)) = (
            network.parse::<IpAddr>(),
            prefix.parse::<u8>(),
            address.parse::<IpAddr>(),
        ) {
            return cidr_contains(network, prefix, addr);
        }
        return false;
    }

    if pattern.contains('*') {
        let escaped = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        return Regex::new(&format!("^{escaped}$"))
            .map(|re| re.is_match(address))
            .unwrap_or(false);
    }

    pattern == address
}

fn cidr_contains(network: IpAddr, prefix: u8, addr: IpAddr) -> bool {
    match (network, addr) {
        (IpAddr::V4(net), IpAddr::V4(ip)) => {
            let prefix = prefix.min(32) as u32;
            if prefix == 0 {
                return true;
            }
            let mask = u32::MAX << (32 - prefix);
            (u32::from(net) & mask) == (u32::from(ip) & mask)
        }
        (IpAddr::V6(net), IpAddr::V6(ip)) => {
            let prefix = prefix.min(128) as u32;
            if prefix == 0 {
                return true;
            }
            let mask = u128::MAX << (128 - prefix);
            (u128::from(net) & mask) == (u128::from(ip) & mask)
        }
        _ => false,
    }
}

/// Outcome of the allow/deny evaluation for one source address.
#[must_use]
pub fn address_permitted(allow: &[String], deny: &[String], address: &str) -> bool {
    if deny.iter().any(|p| address_matches(p, address)) {
        return false;
    }
    if allow.is_empty() {
        return true;
    }
    allow.iter().any(|p| address_matches(p, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_wildcard_and_cidr_patterns() {
        assert!(address_matches("10.0.0.5", "10.0.0.5"));
        assert!(address_matches("10.0.*", "10.0.12.9"));
        assert!(address_matches("10.*.9", "10.44.9"));
        assert!(!address_matches("10.*.9", "11.44.9"));
        assert!(address_matches("10.0.0.0/8", "10.200.1.1"));
        assert!(!address_matches("10.0.0.0/16", "10.200.1.1"));
        assert!(address_matches("::1/128", "::1"));
        assert!(!address_matches("10.0.0.0/8", "not-an-ip"));
    }

    #[test]
    fn deny_wins_over_allow() {
        let allow = vec!["10.0.0.0/8".to_string()];
        let deny = vec!["10.0.0.66".to_string()];
        assert!(address_permitted(&allow, &deny, "10.0.0.5"));
        assert!(!address_permitted(&allow, &deny, "10.0.0.66"));
        assert!(!address_permitted(&allow, &deny, "192.168.1.1"));
    }

    #[test]
    fn empty_allow_list_admits_everything_not_denied() {
        assert!(address_permitted(&[], &[], "203.0.113.7"));
        assert!(!address_permitted(
            &[],
            &["203.0.113.*".to_string()],
            "203.0.113.7"
        ));
    }
}
