use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Args;
use tracing::debug;
use vehicle_tax_core::{
    CalculationRequest, EuroNorm, FirstRegistration, FuelType, Region, Vehicle,
};

use super::{RegionArg, TaxTypeArg, to_json};
use crate::app::App;
use crate::report;

fn parse_fuel(s: &str) -> Result<FuelType, String> {
    FuelType::parse(s).ok_or_else(|| {
        let known: Vec<_> = FuelType::ALL.iter().map(FuelType::as_str).collect();
        format!("unknown fuel '{s}'; expected one of: {}", known.join(", "))
    })
}

fn parse_euro_norm(s: &str) -> Result<EuroNorm, String> {
    EuroNorm::parse(s).ok_or_else(|| {
        let known: Vec<_> = EuroNorm::ALL.iter().map(EuroNorm::as_str).collect();
        format!("unknown euro norm '{s}'; expected one of: {}", known.join(", "))
    })
}

#[derive(Args, Debug)]
pub struct CalculateCommand {
    /// Region levying the tax
    #[arg(short, long, value_enum)]
    pub region: RegionArg,

    /// Tax to calculate; both when omitted
    #[arg(short, long, value_enum)]
    pub tax_type: Option<TaxTypeArg>,

    /// Date the rules are resolved on (defaults to today)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    /// Fuel type, e.g. petrol, diesel, lpg, electric, plug_in_hybrid_petrol
    #[arg(short, long, value_parser = parse_fuel)]
    pub fuel: FuelType,

    /// Year of first registration
    #[arg(short = 'y', long)]
    pub year: i32,

    /// Month of first registration; January when omitted
    #[arg(short = 'm', long)]
    pub month: Option<u32>,

    #[arg(long)]
    pub power_kw: Option<i32>,

    #[arg(long)]
    pub fiscal_hp: Option<i32>,

    /// Engine displacement in cm3; stands in for --fiscal-hp when that is unknown
    #[arg(long)]
    pub displacement_cc: Option<i32>,

    /// Euro emission norm, e.g. euro_6d
    #[arg(long, value_parser = parse_euro_norm)]
    pub euro_norm: Option<EuroNorm>,

    /// CO2 emissions in g/km, WLTP cycle
    #[arg(long)]
    pub co2_wltp: Option<i32>,

    /// CO2 emissions in g/km, NEDC cycle
    #[arg(long)]
    pub co2_nedc: Option<i32>,

    /// Maximum authorised mass in kg
    #[arg(long)]
    pub mass_kg: Option<i32>,

    /// Claimed reduction type code; repeat for several
    #[arg(long = "reduction", value_name = "CODE")]
    pub reductions: Vec<String>,
}

impl CalculateCommand {
    pub fn vehicle(&self) -> Result<Vehicle> {
        let first_registration = FirstRegistration::new(self.year, self.month)
            .context("invalid first registration")?;
        Ok(Vehicle {
            power_kw: self.power_kw,
            fiscal_hp: self.fiscal_hp,
            displacement_cc: self.displacement_cc,
            fuel: self.fuel,
            euro_norm: self.euro_norm,
            co2_wltp: self.co2_wltp,
            co2_nedc: self.co2_nedc,
            mass_kg: self.mass_kg,
            first_registration,
        })
    }

    pub async fn run(&self, app: &App, json: bool) -> Result<String> {
        let vehicle = self.vehicle()?;
        let region = Region::from(self.region);
        let as_of = self.as_of.unwrap_or_else(|| Local::now().date_naive());
        debug!(%region, %as_of, fuel = %vehicle.fuel, "calculating");

        match self.tax_type {
            Some(tax_type) => {
                let request = CalculationRequest {
                    vehicle,
                    region,
                    tax_type: tax_type.into(),
                    as_of,
                    claimed_reductions: self.reductions.clone(),
                };
                let calc = app
                    .engine()
                    .calculate_tax(&request)
                    .await
                    .with_context(|| {
                        format!("{} {} calculation failed", region, request.tax_type)
                    })?;
                if json {
                    to_json(&calc)
                } else {
                    Ok(report::render_calculation(&calc))
                }
            }
            None => {
                let pair = app
                    .engine()
                    .calculate_both(&vehicle, region, as_of, &self.reductions)
                    .await
                    .with_context(|| format!("{region} calculation failed"))?;
                if json {
                    to_json(&pair)
                } else {
                    Ok(report::render_pair(&pair))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fuel_names_use_snake_case() {
        assert_eq!(parse_fuel("plug_in_hybrid_diesel"), Ok(FuelType::PlugInHybridDiesel));
        let err = parse_fuel("steam").unwrap_err();
        assert!(err.starts_with("unknown fuel 'steam'; expected one of: petrol, diesel"));
    }

    #[test]
    fn euro_norm_sub_variants_parse() {
        assert_eq!(parse_euro_norm("euro_6d_temp"), Ok(EuroNorm::Euro6dTemp));
        assert!(parse_euro_norm("euro6").is_err());
    }
}
