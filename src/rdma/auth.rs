//! VNI authentication resolution and mount-option parsing (component H).

use super::fabric::FabricProvider;
use crate::config::Config;
use crate::error::{Error, Result};

/// Authentication key attached to a QP at RESET -> INIT. kfabric's VNI
/// replaces the verbs partition key / GID triple.
#[derive(Debug, Clone, Copy)]
pub struct AuthKey {
    pub vni: u16,
    pub service_id: u16,
    pub traffic_class: u8,
}

/// Resolve a VNI in priority order: an out-of-band override (typically a
/// parsed mount option) first, then the provider's ambient default. Returns
/// `None` if neither source has one, in which case the caller must fail the
/// RESET -> INIT transition with a permission error.
pub fn resolve_vni(override_vni: Option<u16>, provider: &dyn FabricProvider) -> Option<u16> {
    override_vni.or_else(|| provider.query_default_vni())
}

/// Parse a comma-separated mount-option string, looking for `vni=N` with
/// `0 <= N <= 65535`. The first occurrence wins; later occurrences are
/// ignored. Fails invalid-argument if no `vni=` option is present at all, or
/// if its value is missing, non-numeric, or out of range.
pub fn parse_vni_from_options(options: &str) -> Result<u16> {
    for opt in options.split(',') {
        let opt = opt.trim();
        let Some(value) = opt.strip_prefix("vni=") else {
            continue;
        };
        let n: u32 = value
            .parse()
            .map_err(|_| Error::InvalidMountOption(options.to_owned()))?;
        if n > Config::VNI_MAX {
            return Err(Error::InvalidMountOption(options.to_owned()));
        }
        return Ok(n as u16);
    }
    Err(Error::InvalidMountOption(options.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdma::fabric::fake::FakeFabric;

    #[test]
    fn parses_vni_option() {
        assert_eq!(parse_vni_from_options("vni=1000").unwrap(), 1000);
    }

    #[test]
    fn parses_vni_among_other_options() {
        assert_eq!(parse_vni_from_options("foo=bar,vni=42,baz=qux").unwrap(), 42);
    }

    #[test]
    fn missing_vni_option_is_rejected() {
        assert!(parse_vni_from_options("foo=bar").is_err());
        assert!(parse_vni_from_options("proto=rdma,port=20049").is_err());
        assert!(parse_vni_from_options("").is_err());
    }

    #[test]
    fn out_of_range_vni_is_rejected() {
        assert!(parse_vni_from_options("vni=65536").is_err());
    }

    #[test]
    fn non_numeric_vni_is_rejected() {
        assert!(parse_vni_from_options("vni=abc").is_err());
    }

    #[test]
    fn override_takes_priority_over_provider_default() {
        let fake = FakeFabric::new();
        assert_eq!(resolve_vni(Some(7), &fake), Some(7));
    }

    #[test]
    fn falls_back_to_provider_default_when_no_override() {
        let fake = FakeFabric::new();
        assert_eq!(resolve_vni(None, &fake), None);
    }
}
