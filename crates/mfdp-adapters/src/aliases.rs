use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use mfdp_core::DataCategory;
use serde::Deserialize;

use crate::coerce::normalize_key;
use crate::sheet::CellValue;
use crate::AdapterError;

/// Canonical field plus the header spellings accepted for it, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub field: &'static str,
    pub aliases: &'static [&'static str],
}

pub const FACTSHEET_ALIASES: &[FieldAliases] = &[
    FieldAliases { field: "isin", aliases: &["ISIN", "Scheme ISIN", "Fund ISIN"] },
    FieldAliases { field: "scheme_name", aliases: &["Scheme Name", "Fund Name", "Scheme"] },
    FieldAliases { field: "fund_type", aliases: &["Fund Type", "Type", "Category"] },
    FieldAliases { field: "fund_subtype", aliases: &["Fund Sub Type", "Subtype", "Sub Type", "Sub Category"] },
    FieldAliases { field: "amc_name", aliases: &["AMC Name", "AMC", "Fund House"] },
    FieldAliases { field: "fund_manager", aliases: &["Fund Manager", "Fund Manager(s)", "Fund Managers"] },
    FieldAliases { field: "aum", aliases: &["AUM", "AUM (₹ Cr)", "AUM (Rs Cr)", "AUM (Cr)"] },
    FieldAliases { field: "expense_ratio", aliases: &["Expense Ratio", "Expense Ratio (%)", "TER"] },
    FieldAliases { field: "launch_date", aliases: &["Launch Date", "Inception Date"] },
    FieldAliases { field: "exit_load", aliases: &["Exit Load"] },
];

pub const RETURNS_ALIASES: &[FieldAliases] = &[
    FieldAliases { field: "isin", aliases: &["ISIN", "Scheme ISIN", "Fund ISIN"] },
    FieldAliases { field: "return_1m", aliases: &["1M Return", "Return 1M", "1 Month Return", "1M"] },
    FieldAliases { field: "return_3m", aliases: &["3M Return", "Return 3M", "3 Month Return", "3M"] },
    FieldAliases { field: "return_6m", aliases: &["6M Return", "Return 6M", "6 Month Return", "6M"] },
    FieldAliases { field: "return_ytd", aliases: &["YTD Return", "Return YTD", "YTD"] },
    FieldAliases { field: "return_1y", aliases: &["1Y Return", "Return 1Y", "1 Year Return", "1Y"] },
    FieldAliases { field: "return_3y", aliases: &["3Y Return", "Return 3Y", "3 Year Return", "3Y"] },
    FieldAliases { field: "return_5y", aliases: &["5Y Return", "Return 5Y", "5 Year Return", "5Y"] },
];

pub const PORTFOLIO_ALIASES: &[FieldAliases] = &[
    FieldAliases { field: "scheme_isin", aliases: &["Scheme ISIN", "Fund ISIN"] },
    FieldAliases { field: "scheme_name", aliases: &["Scheme Name", "Fund Name"] },
    FieldAliases { field: "instrument_isin", aliases: &["Instrument ISIN", "ISIN"] },
    FieldAliases {
        field: "instrument_name",
        aliases: &["Name of Instrument", "Name Of the Instrument", "Instrument Name", "Instrument"],
    },
    FieldAliases { field: "sector", aliases: &["Industry", "Sector"] },
    FieldAliases { field: "quantity", aliases: &["Quantity", "Qty"] },
    FieldAliases { field: "value", aliases: &["Market Value", "Value", "Market Value (Rs. in Lakhs)"] },
    FieldAliases {
        field: "percentage_to_nav",
        aliases: &["% to Net Assets", "% to NAV", "% to AUM", "Percentage to NAV"],
    },
    FieldAliases { field: "yield_value", aliases: &["Yield", "Yield (%)"] },
    FieldAliases { field: "instrument_type", aliases: &["Type", "Instrument Type", "Asset Type"] },
    FieldAliases { field: "coupon", aliases: &["Coupon", "Coupon (%)"] },
    FieldAliases { field: "amc_name", aliases: &["AMC", "AMC Name"] },
];

pub const NAV_ALIASES: &[FieldAliases] = &[
    FieldAliases { field: "isin", aliases: &["ISIN", "Scheme ISIN", "Fund ISIN"] },
    FieldAliases { field: "scheme_name", aliases: &["Scheme Name", "Fund Name"] },
    FieldAliases { field: "date", aliases: &["Date", "NAV Date", "As On Date"] },
    FieldAliases { field: "nav", aliases: &["Net Asset Value", "NAV", "NAV (Rs)"] },
];

pub fn builtin_aliases(category: DataCategory) -> &'static [FieldAliases] {
    match category {
        DataCategory::Factsheet => FACTSHEET_ALIASES,
        DataCategory::Returns => RETURNS_ALIASES,
        DataCategory::Portfolio => PORTFOLIO_ALIASES,
        DataCategory::Nav => NAV_ALIASES,
    }
}

/// Owned alias table for one category; the built-ins plus any configured extras.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasTable {
    fields: Vec<(String, Vec<String>)>,
}

impl AliasTable {
    pub fn from_entries(entries: &[FieldAliases]) -> Self {
        Self {
            fields: entries
                .iter()
                .map(|entry| {
                    (
                        entry.field.to_string(),
                        entry.aliases.iter().map(|a| a.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    pub fn builtin(category: DataCategory) -> Self {
        Self::from_entries(builtin_aliases(category))
    }

    pub fn aliases(&self, field: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, aliases)| aliases.as_slice())
    }

    /// Appends extra spellings after the existing ones. Unknown fields are rejected.
    pub fn extend(&mut self, field: &str, extra: &[String]) -> Result<(), AdapterError> {
        let (_, aliases) = self
            .fields
            .iter_mut()
            .find(|(name, _)| name == field)
            .ok_or_else(|| AdapterError::UnknownField(field.to_string()))?;
        for alias in extra {
            if !aliases.iter().any(|a| normalize_key(a) == normalize_key(alias)) {
                aliases.push(alias.clone());
            }
        }
        Ok(())
    }

    /// Maps each field to the first header matching one of its aliases.
    pub fn resolve(&self, headers: &[String]) -> ColumnMap {
        let mut by_key: BTreeMap<String, usize> = BTreeMap::new();
        for (idx, header) in headers.iter().enumerate() {
            let key = normalize_key(header);
            if !key.is_empty() {
                by_key.entry(key).or_insert(idx);
            }
        }
        let mut columns = BTreeMap::new();
        for (field, aliases) in &self.fields {
            if let Some(idx) = aliases.iter().find_map(|a| by_key.get(&normalize_key(a))) {
                columns.insert(field.clone(), *idx);
            }
        }
        ColumnMap { columns }
    }
}

/// Field name to column index, resolved once per file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    columns: BTreeMap<String, usize>,
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl ColumnMap {
    pub fn has(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    pub fn index(&self, field: &str) -> Option<usize> {
        self.columns.get(field).copied()
    }

    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required.iter().copied().filter(|f| !self.has(f)).collect()
    }

    pub fn cell<'r>(&self, row: &'r [CellValue], field: &str) -> &'r CellValue {
        self.index(field)
            .and_then(|idx| row.get(idx))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn text(&self, row: &[CellValue], field: &str) -> Option<String> {
        self.cell(row, field).as_text()
    }

    pub fn number(&self, row: &[CellValue], field: &str) -> Option<f64> {
        self.cell(row, field).as_f64()
    }

    pub fn date(&self, row: &[CellValue], field: &str) -> Result<Option<NaiveDate>, AdapterError> {
        self.cell(row, field).as_date().map_err(AdapterError::InvalidDate)
    }
}

#[derive(Debug, Deserialize)]
struct AliasOverrideFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    aliases: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

/// Built-in alias tables for every category.
pub fn builtin_tables() -> BTreeMap<DataCategory, AliasTable> {
    DataCategory::ALL
        .into_iter()
        .map(|c| (c, AliasTable::builtin(c)))
        .collect()
}

/// Built-in tables extended with the YAML override file, when one is configured.
pub fn load_alias_tables(path: Option<&Path>) -> Result<BTreeMap<DataCategory, AliasTable>> {
    let mut tables = builtin_tables();
    let Some(path) = path else {
        return Ok(tables);
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading alias file {}", path.display()))?;
    apply_alias_overrides(&mut tables, &text)
        .with_context(|| format!("parsing alias file {}", path.display()))?;
    Ok(tables)
}

pub fn apply_alias_overrides(
    tables: &mut BTreeMap<DataCategory, AliasTable>,
    yaml: &str,
) -> Result<()> {
    let file: AliasOverrideFile = serde_yaml::from_str(yaml)?;
    for (category, fields) in file.aliases {
        let category: DataCategory = category.parse()?;
        let Some(table) = tables.get_mut(&category) else {
            bail!("no alias table for {category}");
        };
        for (field, extra) in fields {
            table
                .extend(&field, &extra)
                .with_context(|| format!("{category} aliases"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolve_prefers_earlier_alias() {
        let table = AliasTable::builtin(DataCategory::Portfolio);
        let cols = table.resolve(&headers(&["Value", "Market Value", "% to NAV", " name of instrument "]));
        assert_eq!(cols.index("value"), Some(1));
        assert_eq!(cols.index("percentage_to_nav"), Some(2));
        assert_eq!(cols.index("instrument_name"), Some(3));
        assert!(!cols.has("scheme_isin"));
    }

    #[test]
    fn missing_lists_unresolved_required_fields() {
        let cols = AliasTable::builtin(DataCategory::Nav).resolve(&headers(&["ISIN", "Date"]));
        assert_eq!(cols.missing(&["date", "nav"]), vec!["nav"]);
    }

    #[test]
    fn overrides_append_after_builtins() {
        let mut tables = builtin_tables();
        apply_alias_overrides(
            &mut tables,
            "version: 1\naliases:\n  portfolio:\n    percentage_to_nav: [\"Weight (%)\"]\n",
        )
        .unwrap();
        let table = &tables[&DataCategory::Portfolio];
        let aliases = table.aliases("percentage_to_nav").unwrap();
        assert_eq!(aliases.first().map(String::as_str), Some("% to Net Assets"));
        assert_eq!(aliases.last().map(String::as_str), Some("Weight (%)"));
        let cols = table.resolve(&headers(&["Weight (%)"]));
        assert_eq!(cols.index("percentage_to_nav"), Some(0));
    }

    #[test]
    fn overrides_reject_unknown_category_and_field() {
        let mut tables = builtin_tables();
        assert!(apply_alias_overrides(&mut tables, "version: 1\naliases:\n  ratings:\n    x: [a]\n").is_err());
        assert!(apply_alias_overrides(&mut tables, "version: 1\naliases:\n  nav:\n    price: [a]\n").is_err());
    }

    #[test]
    fn load_without_file_returns_builtins() {
        let tables = load_alias_tables(None).unwrap();
        assert_eq!(tables.len(), 4);
        assert_eq!(tables[&DataCategory::Nav], AliasTable::builtin(DataCategory::Nav));
    }

    #[test]
    fn load_reads_yaml_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aliases.yaml");
        std::fs::write(&path, "version: 1\naliases:\n  nav:\n    nav: [\"Closing NAV\"]\n").unwrap();
        let tables = load_alias_tables(Some(&path)).unwrap();
        let cols = tables[&DataCategory::Nav].resolve(&headers(&["Closing NAV"]));
        assert!(cols.has("nav"));
    }
}
