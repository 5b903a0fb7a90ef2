use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TaxError;
use crate::models::{Region, TaxType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    Petrol,
    Diesel,
    Lpg,
    Cng,
    HybridPetrol,
    HybridDiesel,
    PlugInHybridPetrol,
    PlugInHybridDiesel,
    Electric,
    Hydrogen,
}

impl FuelType {
    pub const ALL: [FuelType; 10] = [
        Self::Petrol,
        Self::Diesel,
        Self::Lpg,
        Self::Cng,
        Self::HybridPetrol,
        Self::HybridDiesel,
        Self::PlugInHybridPetrol,
        Self::PlugInHybridDiesel,
        Self::Electric,
        Self::Hydrogen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Petrol => "petrol",
            Self::Diesel => "diesel",
            Self::Lpg => "lpg",
            Self::Cng => "cng",
            Self::HybridPetrol => "hybrid_petrol",
            Self::HybridDiesel => "hybrid_diesel",
            Self::PlugInHybridPetrol => "plug_in_hybrid_petrol",
            Self::PlugInHybridDiesel => "plug_in_hybrid_diesel",
            Self::Electric => "electric",
            Self::Hydrogen => "hydrogen",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|fuel| fuel.as_str() == s)
    }

    /// Electric and hydrogen vehicles emit no CO2 at the exhaust.
    pub fn is_zero_emission(&self) -> bool {
        matches!(self, Self::Electric | Self::Hydrogen)
    }

    pub fn is_hybrid(&self) -> bool {
        matches!(
            self,
            Self::HybridPetrol
                | Self::HybridDiesel
                | Self::PlugInHybridPetrol
                | Self::PlugInHybridDiesel
        )
    }

    /// Fuels taxed with the diesel air-quality component in Flanders.
    pub fn is_diesel_engine(&self) -> bool {
        matches!(
            self,
            Self::Diesel | Self::HybridDiesel | Self::PlugInHybridDiesel
        )
    }

    /// Condition key under which exemptions for this fuel are stored.
    pub fn exemption_condition(&self) -> String {
        format!("fuel_{}", self.as_str())
    }
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EuroNorm {
    #[serde(rename = "euro_1")]
    Euro1,
    #[serde(rename = "euro_2")]
    Euro2,
    #[serde(rename = "euro_3")]
    Euro3,
    #[serde(rename = "euro_4")]
    Euro4,
    #[serde(rename = "euro_5")]
    Euro5,
    #[serde(rename = "euro_6")]
    Euro6,
    #[serde(rename = "euro_6d_temp")]
    Euro6dTemp,
    #[serde(rename = "euro_6d")]
    Euro6d,
    #[serde(rename = "euro_7")]
    Euro7,
}

impl EuroNorm {
    pub const ALL: [EuroNorm; 9] = [
        Self::Euro1,
        Self::Euro2,
        Self::Euro3,
        Self::Euro4,
        Self::Euro5,
        Self::Euro6,
        Self::Euro6dTemp,
        Self::Euro6d,
        Self::Euro7,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Euro1 => "euro_1",
            Self::Euro2 => "euro_2",
            Self::Euro3 => "euro_3",
            Self::Euro4 => "euro_4",
            Self::Euro5 => "euro_5",
            Self::Euro6 => "euro_6",
            Self::Euro6dTemp => "euro_6d_temp",
            Self::Euro6d => "euro_6d",
            Self::Euro7 => "euro_7",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|norm| norm.as_str() == s)
    }

    /// Ordinal used as the lookup value of the luchtcomponent brackets.
    /// All Euro 6 sub-variants share ordinal 6.
    pub fn ordinal(&self) -> i32 {
        match self {
            Self::Euro1 => 1,
            Self::Euro2 => 2,
            Self::Euro3 => 3,
            Self::Euro4 => 4,
            Self::Euro5 => 5,
            Self::Euro6 | Self::Euro6dTemp | Self::Euro6d => 6,
            Self::Euro7 => 7,
        }
    }
}

/// Date of first registration as it appears on the registration certificate.
///
/// Older certificates only carry the year. A missing month resolves to
/// January, which yields the oldest possible registration date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstRegistration {
    pub year: i32,
    pub month: Option<u32>,
}

impl FirstRegistration {
    pub const MIN_YEAR: i32 = 1900;
    pub const MAX_YEAR: i32 = 2100;

    pub fn new(year: i32, month: Option<u32>) -> Result<Self, TaxError> {
        let registration = Self { year, month };
        registration.date()?;
        Ok(registration)
    }

    /// Resolves the registration to the first day of its month.
    ///
    /// # Errors
    ///
    /// Returns [`TaxError::InvalidRequest`] when the year lies outside
    /// 1900..=2100 or the month outside 1..=12.
    pub fn date(&self) -> Result<NaiveDate, TaxError> {
        if !(Self::MIN_YEAR..=Self::MAX_YEAR).contains(&self.year) {
            return Err(TaxError::InvalidRequest(format!(
                "first registration year {} outside {}..={}",
                self.year,
                Self::MIN_YEAR,
                Self::MAX_YEAR
            )));
        }
        let month = self.month.unwrap_or(1);
        if !(1..=12).contains(&month) {
            return Err(TaxError::InvalidRequest(format!(
                "first registration month {month} outside 1..=12"
            )));
        }
        NaiveDate::from_ymd_opt(self.year, month, 1).ok_or_else(|| {
            TaxError::InvalidRequest(format!(
                "invalid first registration {}-{month:02}",
                self.year
            ))
        })
    }
}

/// The vehicle attributes the tax formulas draw from.
///
/// Every technical attribute is optional because the attribute provider may
/// not know it; each formula declares which ones it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub power_kw: Option<i32>,
    pub fiscal_hp: Option<i32>,
    /// Engine displacement in cm³. Converted to fiscal horsepower through the
    /// `displacement_cc` annual brackets when `fiscal_hp` is unknown.
    #[serde(default)]
    pub displacement_cc: Option<i32>,
    pub fuel: FuelType,
    pub euro_norm: Option<EuroNorm>,
    pub co2_wltp: Option<i32>,
    pub co2_nedc: Option<i32>,
    pub mass_kg: Option<i32>,
    pub first_registration: FirstRegistration,
}

impl Vehicle {
    /// Lists the attributes the formula for `(region, tax_type)` needs but
    /// that this vehicle does not carry. Empty means the vehicle is complete.
    pub fn missing_attributes(&self, region: Region, tax_type: TaxType) -> Vec<String> {
        let mut missing = Vec::new();
        let has_co2 = self.co2_wltp.is_some() || self.co2_nedc.is_some();
        let combustion = !self.fuel.is_zero_emission();

        match (region, tax_type) {
            (_, TaxType::Annual) => {
                if self.fiscal_hp.is_none() {
                    missing.push("fiscal_hp");
                }
            }
            (Region::Wallonia, TaxType::Tmc) => {
                if self.power_kw.is_none() {
                    missing.push("power_kw");
                }
                if self.mass_kg.is_none() {
                    missing.push("mass_kg");
                }
                if combustion && !has_co2 {
                    missing.push("co2");
                }
            }
            (Region::Brussels, TaxType::Tmc) => {
                if combustion && self.fiscal_hp.is_none() && self.power_kw.is_none() {
                    missing.push("fiscal_hp or power_kw");
                }
            }
            (Region::Flanders, TaxType::Tmc) => {
                if combustion {
                    if !has_co2 {
                        missing.push("co2");
                    }
                    if self.euro_norm.is_none() {
                        missing.push("euro_norm");
                    }
                }
            }
        }

        missing.into_iter().map(String::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vehicle(fuel: FuelType) -> Vehicle {
        Vehicle {
            power_kw: None,
            fiscal_hp: None,
            displacement_cc: None,
            fuel,
            euro_norm: None,
            co2_wltp: None,
            co2_nedc: None,
            mass_kg: None,
            first_registration: FirstRegistration {
                year: 2024,
                month: Some(3),
            },
        }
    }

    // =========================================================================
    // FuelType / EuroNorm
    // =========================================================================

    #[test]
    fn fuel_parse_round_trips_every_variant() {
        for fuel in FuelType::ALL {
            assert_eq!(FuelType::parse(fuel.as_str()), Some(fuel));
        }
        assert_eq!(FuelType::parse("kerosene"), None);
    }

    #[test]
    fn fuel_exemption_condition_uses_fuel_prefix() {
        assert_eq!(FuelType::Electric.exemption_condition(), "fuel_electric");
        assert_eq!(
            FuelType::PlugInHybridDiesel.exemption_condition(),
            "fuel_plug_in_hybrid_diesel"
        );
    }

    #[test]
    fn only_electric_and_hydrogen_are_zero_emission() {
        let zero: Vec<FuelType> = FuelType::ALL
            .into_iter()
            .filter(FuelType::is_zero_emission)
            .collect();
        assert_eq!(zero, vec![FuelType::Electric, FuelType::Hydrogen]);
    }

    #[test]
    fn euro_6_variants_share_ordinal_six() {
        assert_eq!(EuroNorm::Euro6.ordinal(), 6);
        assert_eq!(EuroNorm::Euro6dTemp.ordinal(), 6);
        assert_eq!(EuroNorm::Euro6d.ordinal(), 6);
        assert_eq!(EuroNorm::Euro7.ordinal(), 7);
        assert_eq!(EuroNorm::parse("euro_6d_temp"), Some(EuroNorm::Euro6dTemp));
    }

    // =========================================================================
    // FirstRegistration
    // =========================================================================

    #[test]
    fn registration_without_month_resolves_to_january() {
        let registration = FirstRegistration::new(2019, None).unwrap();
        assert_eq!(
            registration.date().unwrap(),
            NaiveDate::from_ymd_opt(2019, 1, 1).unwrap()
        );
    }

    #[test]
    fn registration_rejects_out_of_range_values() {
        assert!(matches!(
            FirstRegistration::new(1899, Some(5)),
            Err(TaxError::InvalidRequest(_))
        ));
        assert!(matches!(
            FirstRegistration::new(2101, None),
            Err(TaxError::InvalidRequest(_))
        ));
        assert!(matches!(
            FirstRegistration::new(2020, Some(13)),
            Err(TaxError::InvalidRequest(_))
        ));
        assert!(matches!(
            FirstRegistration::new(2020, Some(0)),
            Err(TaxError::InvalidRequest(_))
        ));
    }

    // =========================================================================
    // missing_attributes
    // =========================================================================

    #[test]
    fn wallonia_tmc_lists_every_missing_attribute() {
        let missing = vehicle(FuelType::Diesel).missing_attributes(Region::Wallonia, TaxType::Tmc);
        assert_eq!(missing, vec!["power_kw", "mass_kg", "co2"]);
    }

    #[test]
    fn wallonia_tmc_electric_does_not_need_co2() {
        let mut ev = vehicle(FuelType::Electric);
        ev.power_kw = Some(100);
        ev.mass_kg = Some(1900);
        assert!(ev.missing_attributes(Region::Wallonia, TaxType::Tmc).is_empty());
    }

    #[test]
    fn brussels_tmc_accepts_either_power_dimension() {
        let mut car = vehicle(FuelType::Petrol);
        assert_eq!(
            car.missing_attributes(Region::Brussels, TaxType::Tmc),
            vec!["fiscal_hp or power_kw"]
        );
        car.power_kw = Some(85);
        assert!(car.missing_attributes(Region::Brussels, TaxType::Tmc).is_empty());
    }

    #[test]
    fn flanders_tmc_needs_co2_and_euro_norm() {
        let mut car = vehicle(FuelType::Petrol);
        car.co2_nedc = Some(120);
        assert_eq!(
            car.missing_attributes(Region::Flanders, TaxType::Tmc),
            vec!["euro_norm"]
        );
    }

    #[test]
    fn annual_needs_fiscal_hp_in_every_region() {
        for region in Region::ALL {
            assert_eq!(
                vehicle(FuelType::Electric).missing_attributes(region, TaxType::Annual),
                vec!["fiscal_hp"]
            );
        }
    }
}
