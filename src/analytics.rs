use crate::models::{Company, EnergyCategory};
use serde::Serialize;

/// Number of companies shown in the consumption ranking.
const TOP_CONSUMERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerBar {
    /// Label for the chart axis, shortened for long names.
    pub name: String,
    pub consumption: f64,
    pub full: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyAnalytics {
    pub high_count: usize,
    pub low_count: usize,
    pub total_consumption_gwh: f64,
    pub top_consumers: Vec<ConsumerBar>,
}

/// Chart label: names over 15 characters become their first 12 plus `...`.
pub fn short_label(name: &str) -> String {
    if name.chars().count() > 15 {
        let head: String = name.chars().take(12).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}

/// Category split, total and top consumers for the current list.
pub fn summarize(companies: &[Company]) -> EnergyAnalytics {
    let high_count = companies
        .iter()
        .filter(|c| c.category == EnergyCategory::High)
        .count();

    let mut ranked: Vec<&Company> = companies.iter().collect();
    ranked.sort_by(|a, b| {
        b.estimated_consumption_gwh
            .total_cmp(&a.estimated_consumption_gwh)
    });

    EnergyAnalytics {
        high_count,
        low_count: companies.len() - high_count,
        total_consumption_gwh: companies.iter().map(|c| c.estimated_consumption_gwh).sum(),
        top_consumers: ranked
            .into_iter()
            .take(TOP_CONSUMERS)
            .map(|c| ConsumerBar {
                name: short_label(&c.name),
                consumption: c.estimated_consumption_gwh,
                full: c.name.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(name: &str, gwh: f64) -> Company {
        Company {
            id: name.to_string(),
            name: name.to_string(),
            vat_number: None,
            address: String::new(),
            city: String::new(),
            province: String::new(),
            industry: String::new(),
            estimated_consumption_gwh: gwh,
            category: EnergyCategory::from_consumption(gwh),
            website: None,
            phone: None,
            email: None,
        }
    }

    #[test]
    fn test_counts_and_total() {
        let companies = vec![company("A", 0.5), company("B", 2.0), company("C", 1.5)];
        let stats = summarize(&companies);
        assert_eq!(stats.high_count, 1);
        assert_eq!(stats.low_count, 2);
        assert!((stats.total_consumption_gwh - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_eight_descending() {
        let companies: Vec<Company> = (0..10).map(|i| company(&format!("C{}", i), i as f64)).collect();
        let stats = summarize(&companies);
        assert_eq!(stats.top_consumers.len(), 8);
        assert_eq!(stats.top_consumers[0].full, "C9");
        assert_eq!(stats.top_consumers[7].full, "C2");
    }

    #[test]
    fn test_short_label() {
        assert_eq!(short_label("Acciaierie Venete"), "Acciaierie V...");
        assert_eq!(short_label("Exactly15Chars!"), "Exactly15Chars!");
        assert_eq!(short_label("Società Elettrica"), "Società Elet...");
    }

    #[test]
    fn test_empty_list() {
        let stats = summarize(&[]);
        assert_eq!(stats.high_count + stats.low_count, 0);
        assert!(stats.top_consumers.is_empty());
    }
}
