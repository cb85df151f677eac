use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SqlError;

/// `major.minor` of a database server. Build and patch numbers are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u16,
    pub minor: u16,
}

impl ServerVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Accepts `9`, `8.3`, `11.0.2100.60` and server banners such as
/// `15.4 (Debian 15.4-1.pgdg120+1)`.
impl FromStr for ServerVersion {
    type Err = SqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let head = s
            .trim()
            .split(|c: char| !(c.is_ascii_digit() || c == '.'))
            .next()
            .unwrap_or("");
        let mut parts = head.split('.').filter(|p| !p.is_empty());
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| SqlError::InvalidVersion(s.to_string()))?;
        let minor = match parts.next() {
            Some(p) => p
                .parse()
                .map_err(|_| SqlError::InvalidVersion(s.to_string()))?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_versions() {
        assert_eq!("8.3".parse::<ServerVersion>().unwrap(), ServerVersion::new(8, 3));
        assert_eq!("9".parse::<ServerVersion>().unwrap(), ServerVersion::new(9, 0));
        assert_eq!(
            "11.0.2100.60".parse::<ServerVersion>().unwrap(),
            ServerVersion::new(11, 0)
        );
        assert_eq!(
            "15.4 (Debian 15.4-1.pgdg120+1)".parse::<ServerVersion>().unwrap(),
            ServerVersion::new(15, 4)
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            "abc".parse::<ServerVersion>(),
            Err(SqlError::InvalidVersion(_))
        ));
        assert!("".parse::<ServerVersion>().is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(ServerVersion::new(8, 4) > ServerVersion::new(8, 3));
        assert!(ServerVersion::new(10, 0) > ServerVersion::new(9, 6));
    }
}
