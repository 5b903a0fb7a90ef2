//! Plain-text rendering of command results. `--json` bypasses this module
//! and serializes the result types directly.

use std::fmt::Write;

use vehicle_tax_core::{
    BreakdownValue, IndexationResult, RuleVersion, TaxCalculation, TaxCalculationPair,
    TaxOutcome, TaxType, UserReductionType, Versioned,
};

fn value_text(value: &BreakdownValue) -> String {
    match value {
        BreakdownValue::Flag(true) => "yes".to_string(),
        BreakdownValue::Flag(false) => "no".to_string(),
        BreakdownValue::Integer(n) => n.to_string(),
        BreakdownValue::Amount(d) => d.normalize().to_string(),
        BreakdownValue::Text(s) => s.clone(),
    }
}

pub fn render_calculation(calc: &TaxCalculation) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(
        out,
        "{} {} on {}",
        calc.region,
        calc.tax_type.as_str().to_uppercase(),
        calc.as_of
    );
    let _ = writeln!(out, "  amount      {:.2} EUR", calc.amount);
    match &calc.exemption_reason {
        Some(reason) if calc.is_exempt => {
            let _ = writeln!(out, "  exempt      yes ({reason})");
        }
        _ => {
            let _ = writeln!(out, "  exempt      no");
        }
    }
    if !calc.applied_reductions.is_empty() {
        let _ = writeln!(out, "  reductions  {}", calc.applied_reductions.join(", "));
    }
    if !calc.breakdown.is_empty() {
        let _ = writeln!(out, "  breakdown");
        let width = calc
            .breakdown
            .iter()
            .map(|(key, _)| key.len())
            .max()
            .unwrap_or_default();
        for (key, value) in calc.breakdown.iter() {
            let _ = writeln!(out, "    {key:<width$}  {}", value_text(value));
        }
    }
    out
}

fn render_outcome(pair: &TaxCalculationPair, tax_type: TaxType, outcome: &TaxOutcome) -> String {
    let heading = format!(
        "{} {} on {}",
        pair.region,
        tax_type.as_str().to_uppercase(),
        pair.as_of
    );
    match outcome {
        TaxOutcome::Calculated(calc) => render_calculation(calc),
        TaxOutcome::InsufficientData { missing } => {
            format!("{heading}\n  not calculated  missing {}\n", missing.join(", "))
        }
        TaxOutcome::NotCalculable { reason } => {
            format!("{heading}\n  not calculated  {reason}\n")
        }
    }
}

pub fn render_pair(pair: &TaxCalculationPair) -> String {
    format!(
        "status  {}\n\n{}\n{}",
        pair.status.as_str(),
        render_outcome(pair, TaxType::Tmc, &pair.tmc),
        render_outcome(pair, TaxType::Annual, &pair.annual)
    )
}

pub fn render_indexation(result: &IndexationResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", result.message);
    let _ = writeln!(out, "  brackets updated    {}", result.brackets_updated);
    let _ = writeln!(out, "  parameters updated  {}", result.parameters_updated);
    let _ = writeln!(out, "  skipped             {}", result.skipped);
    out
}

/// What distinguishes rows that share a key: the value range of a bracket or
/// the age of a coefficient.
fn scope(rule: &RuleVersion) -> String {
    match rule {
        RuleVersion::Bracket(b) => match b.max_value {
            Some(max) => format!("{}-{}", b.min_value, max),
            None => format!("{}+", b.min_value),
        },
        RuleVersion::AgeCoefficient(a) => format!("age {}", a.vehicle_age_years),
        RuleVersion::Parameter(_) | RuleVersion::Exemption(_) => String::new(),
    }
}

pub fn render_rules(rules: &[RuleVersion]) -> String {
    if rules.is_empty() {
        return "no rules found\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>6}  {:<9} {:<7} {:<24} {:<9} {:>12}  {:<10}  {:<10}",
        "id", "region", "tax", "key", "scope", "value", "from", "to"
    );
    for rule in rules {
        let validity = rule.validity();
        let value = rule
            .value()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let to = validity
            .valid_to
            .map(|d| d.to_string())
            .unwrap_or_else(|| "open".to_string());
        let _ = writeln!(
            out,
            "{:>6}  {:<9} {:<7} {:<24} {:<9} {:>12}  {:<10}  {:<10}",
            rule.id(),
            rule.region().as_str(),
            rule.tax_type().as_str(),
            rule.key().name(),
            scope(rule),
            value,
            validity.valid_from,
            to
        );
    }
    out
}

pub fn render_reduction_types(types: &[UserReductionType]) -> String {
    if types.is_empty() {
        return "no reduction types found\n".to_string();
    }
    let mut out = String::new();
    for t in types {
        let _ = writeln!(
            out,
            "{:<20} {}",
            t.code,
            t.description.as_deref().unwrap_or("")
        );
    }
    out
}
