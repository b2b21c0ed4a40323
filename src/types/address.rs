use crate::error::{Error, Result};

/// Length in bytes of an account or script address.
pub const ADDRESS_LEN: usize = 20;

/// Converts between raw address bytes and their `<prefix>1<hex>` string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCodec {
    prefix: String,
}

impl AddressCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn encode(&self, bytes: &[u8]) -> String {
        format!("{}1{}", self.prefix, hex::encode(bytes))
    }

    pub fn decode(&self, address: &str) -> Result<Vec<u8>> {
        let body = address
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('1'))
            .ok_or_else(|| {
                Error::InvalidAddress(format!(
                    "{:?} does not start with {}1",
                    address, self.prefix
                ))
            })?;

        let bytes = hex::decode(body)
            .map_err(|e| Error::InvalidAddress(format!("{:?}: {}", address, e)))?;
        if bytes.len() != ADDRESS_LEN {
            return Err(Error::InvalidAddress(format!(
                "{:?}: expected {} bytes, got {}",
                address,
                ADDRESS_LEN,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    pub fn validate(&self, address: &str) -> Result<()> {
        self.decode(address).map(|_| ())
    }

    /// Canonical string form of `address`; the key scripts are stored under.
    pub fn normalize(&self, address: &str) -> Result<String> {
        Ok(self.encode(&self.decode(address)?))
    }

    /// Compares two addresses by their decoded bytes.
    pub fn same(&self, a: &str, b: &str) -> Result<bool> {
        Ok(self.decode(a)? == self.decode(b)?)
    }
}

impl Default for AddressCodec {
    fn default() -> Self {
        Self::new("dys")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_codec() {
        let codec = AddressCodec::default();
        let addr = codec.encode(&[7u8; ADDRESS_LEN]);
        assert!(addr.starts_with("dys1"));
        assert_eq!(codec.decode(&addr).unwrap(), vec![7u8; ADDRESS_LEN]);
        assert!(codec.same(&addr, &addr.to_uppercase().replacen("DYS1", "dys1", 1)).unwrap());

        let upper = format!("dys1{}", hex::encode_upper([7u8; ADDRESS_LEN]));
        assert_eq!(codec.normalize(&upper).unwrap(), addr);
        assert!(codec.normalize("dys1zz").is_err());

        assert!(codec.validate("cosmos1abcd").is_err());
        assert!(codec.validate("dys1zz").is_err());
        assert!(codec.validate(&codec.encode(&[1u8; 4])).is_err());
    }
}
