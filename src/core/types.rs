use super::{CountError, Result};
use serde::{Deserialize, Serialize};

/// A tagged item submitted for counting.
///
/// Missing fields deserialize as empty strings so that a malformed entry can be
/// logged and skipped instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tenant: String,
}

impl Item {
    pub fn new(id: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant: tenant.into(),
        }
    }

    /// Checks that both attributes are present and the tenant can name a file.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() || self.tenant.is_empty() {
            return Err(CountError::InvalidItem(
                "each item should have (id) and (tenant) attributes".to_string(),
            ));
        }
        validate_tenant(&self.tenant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub accepted: usize,
    pub rejected: usize,
}

/// Tenant ids become file names under the storage directory.
pub fn validate_tenant(tenant: &str) -> Result<()> {
    let unsafe_name = tenant.is_empty()
        || tenant == "."
        || tenant == ".."
        || tenant.contains(['/', '\\', '\0']);
    if unsafe_name {
        return Err(CountError::InvalidTenant(tenant.to_string()));
    }
    Ok(())
}

/// Extracts the port a worker listens on from its base URL.
pub fn worker_port(address: &str) -> Result<u16> {
    let url = reqwest::Url::parse(address)
        .map_err(|_| CountError::InvalidAddress(address.to_string()))?;
    url.port_or_known_default()
        .ok_or_else(|| CountError::InvalidAddress(address.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_requires_id_and_tenant() {
        assert!(Item::new("1", "t1").validate().is_ok());
        assert!(matches!(
            Item::new("", "t1").validate(),
            Err(CountError::InvalidItem(_))
        ));
        assert!(matches!(
            Item::new("1", "").validate(),
            Err(CountError::InvalidItem(_))
        ));
    }

    #[test]
    fn missing_fields_deserialize_as_empty() {
        let items: Vec<Item> = serde_json::from_str(r#"[{"id":"1"},{"tenant":"t"}]"#).unwrap();
        assert_eq!(items[0], Item::new("1", ""));
        assert_eq!(items[1], Item::new("", "t"));
    }

    #[test]
    fn tenant_must_be_a_plain_file_name() {
        for bad in ["..", ".", "a/b", "a\\b", "nul\0"] {
            assert!(validate_tenant(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(validate_tenant("tenant-1.prod").is_ok());
    }

    #[test]
    fn port_is_taken_from_the_address() {
        assert_eq!(worker_port("http://localhost:5001").unwrap(), 5001);
        assert_eq!(worker_port("http://localhost").unwrap(), 80);
        assert!(matches!(
            worker_port("not a url"),
            Err(CountError::InvalidAddress(_))
        ));
    }
}
