//! Manufacturer lookup from the OUI prefix of a hardware address.

use std::collections::HashMap;
use std::sync::Mutex;

const CACHE_CAPACITY: usize = 128;

/// Known OUI prefixes: (prefix, vendor name, device class).
pub const KNOWN_VENDORS: &[(&str, &str, &str)] = &[
    ("A4C138", "Apple", "personal device"),
    ("4C0B3E", "Google", "personal device"),
    ("D4F057", "Samsung", "personal device"),
    ("B827EB", "Raspberry Pi", "embedded"),
    ("F0F8F2", "Xiaomi", "personal device"),
    ("001CBF", "Apple", "personal device"),
    ("001D4F", "Samsung", "personal device"),
    ("0022F4", "Intel", "computer"),
];

/// Extracts the six-hex-digit OUI from an identity such as `aa:bb:cc:dd:ee:ff`.
pub fn oui_prefix(identity: &str) -> Option<String> {
    let prefix: String = identity
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .take(6)
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if prefix.len() == 6 && prefix.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(prefix)
    } else {
        None
    }
}

fn lookup(prefix: &str) -> Option<&'static str> {
    KNOWN_VENDORS
        .iter()
        .find(|(oui, _, _)| *oui == prefix)
        .map(|(_, name, _)| *name)
}

/// Memoized OUI to vendor-name resolver.
#[derive(Default)]
pub struct VendorResolver {
    cache: Mutex<HashMap<String, Option<&'static str>>>,
}

impl VendorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vendor name for the identity's prefix, or `None` when unknown.
    pub fn resolve(&self, identity: &str) -> Option<String> {
        let prefix = oui_prefix(identity)?;

        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(hit) = cache.get(&prefix) {
            return hit.map(String::from);
        }

        if cache.len() >= CACHE_CAPACITY {
            cache.clear();
        }

        let resolved = lookup(&prefix);
        cache.insert(prefix, resolved);
        resolved.map(String::from)
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_ignores_separators_and_case() {
        assert_eq!(oui_prefix("a4:c1:38:01:02:03").as_deref(), Some("A4C138"));
        assert_eq!(oui_prefix("b8-27-eb-00-00-00").as_deref(), Some("B827EB"));
        assert_eq!(oui_prefix("001cbf123456").as_deref(), Some("001CBF"));
    }

    #[test]
    fn short_or_non_hex_identity_has_no_prefix() {
        assert_eq!(oui_prefix("AA:BB"), None);
        assert_eq!(oui_prefix("device-one"), None);
        assert_eq!(oui_prefix(""), None);
    }

    #[test]
    fn resolves_known_vendors() {
        let resolver = VendorResolver::new();
        assert_eq!(resolver.resolve("A4:C1:38:DD:EE:FF").as_deref(), Some("Apple"));
        assert_eq!(resolver.resolve("00:22:F4:00:00:01").as_deref(), Some("Intel"));
        assert_eq!(resolver.resolve("12:34:56:78:9A:BC"), None);
    }

    #[test]
    fn repeated_lookups_share_one_cache_entry() {
        let resolver = VendorResolver::new();
        resolver.resolve("D4:F0:57:00:00:01");
        resolver.resolve("D4:F0:57:00:00:02");
        resolver.resolve("d4:f0:57:00:00:03");
        assert_eq!(resolver.cached_entries(), 1);
    }

    #[test]
    fn cache_stays_bounded() {
        let resolver = VendorResolver::new();
        for i in 0..(CACHE_CAPACITY + 10) {
            resolver.resolve(&format!("{:06X}000000", i));
        }
        assert!(resolver.cached_entries() <= CACHE_CAPACITY);
    }
}
