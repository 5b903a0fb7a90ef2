use std::fmt;

use serde::{Deserialize, Serialize};

/// The three Belgian regions that levy vehicle taxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Wallonia,
    Flanders,
    Brussels,
}

impl Region {
    pub const ALL: [Region; 3] = [Self::Wallonia, Self::Flanders, Self::Brussels];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wallonia => "wallonia",
            Self::Flanders => "flanders",
            Self::Brussels => "brussels",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wallonia" => Some(Self::Wallonia),
            "flanders" => Some(Self::Flanders),
            "brussels" => Some(Self::Brussels),
            _ => None,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two regional vehicle taxes a rule or calculation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxType {
    /// One-time registration tax (TMC / BIV).
    Tmc,
    /// Yearly circulation tax.
    Annual,
}

impl TaxType {
    pub const ALL: [TaxType; 2] = [Self::Tmc, Self::Annual];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tmc => "tmc",
            Self::Annual => "annual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tmc" => Some(Self::Tmc),
            "annual" => Some(Self::Annual),
            _ => None,
        }
    }
}

impl fmt::Display for TaxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn region_parse_accepts_every_as_str() {
        for region in Region::ALL {
            assert_eq!(Region::parse(region.as_str()), Some(region));
        }
        assert_eq!(Region::parse("Wallonia"), None);
        assert_eq!(Region::parse(""), None);
    }

    #[test]
    fn tax_type_parse_accepts_every_as_str() {
        for tax_type in TaxType::ALL {
            assert_eq!(TaxType::parse(tax_type.as_str()), Some(tax_type));
        }
        assert_eq!(TaxType::parse("biv"), None);
    }

    #[test]
    fn display_matches_storage_names() {
        assert_eq!(Region::Brussels.to_string(), "brussels");
        assert_eq!(TaxType::Annual.to_string(), "annual");
    }
}
