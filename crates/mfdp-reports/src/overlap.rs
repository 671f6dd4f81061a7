//! Holdings overlap between two or more funds.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use mfdp_core::{Fund, Holding};
use serde::Serialize;

use crate::{mean, population_variance, round2, ReportError};

const TOP_PAIR_HOLDINGS: usize = 20;
const TOP_COMMON_HOLDINGS: usize = 50;
const TOP_OVERLAPPING_FUNDS: usize = 5;

/// One fund and its full holdings snapshot.
#[derive(Debug, Clone)]
pub struct FundHoldings {
    pub fund: Fund,
    pub holdings: Vec<Holding>,
}

/// `ISIN:<isin>` when the instrument ISIN is usable, else `NAME:<UPPER NAME>`.
pub fn instrument_key(holding: &Holding) -> Option<String> {
    match holding.instrument_isin.as_deref().map(str::trim) {
        Some(isin) if !isin.is_empty() && isin != "-" => Some(format!("ISIN:{isin}")),
        _ => {
            let name = holding.instrument_name.trim();
            (!name.is_empty()).then(|| format!("NAME:{}", name.to_uppercase()))
        }
    }
}

/// Instrument key -> holding, last occurrence wins.
fn keyed(holdings: &[Holding]) -> BTreeMap<String, &Holding> {
    holdings
        .iter()
        .filter_map(|h| instrument_key(h).map(|key| (key, h)))
        .collect()
}

pub fn overlap_grade(by_count: f64, by_weight: f64) -> &'static str {
    let avg = (by_count + by_weight) / 2.0;
    if avg >= 80.0 {
        "Very High Overlap"
    } else if avg >= 60.0 {
        "High Overlap"
    } else if avg >= 40.0 {
        "Moderate Overlap"
    } else if avg >= 20.0 {
        "Low Overlap"
    } else {
        "Minimal Overlap"
    }
}

pub fn diversification_grade(score: f64) -> &'static str {
    if score >= 80.0 {
        "Excellent Diversification"
    } else if score >= 65.0 {
        "Good Diversification"
    } else if score >= 50.0 {
        "Moderate Diversification"
    } else if score >= 35.0 {
        "Poor Diversification"
    } else {
        "Very Poor Diversification"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FundDetail {
    pub isin: String,
    pub name: String,
    pub amc: String,
    pub fund_type: String,
    pub fund_subtype: Option<String>,
}

impl From<&Fund> for FundDetail {
    fn from(fund: &Fund) -> Self {
        Self {
            isin: fund.isin.clone(),
            name: fund.scheme_name.clone(),
            amc: fund.amc_name.clone(),
            fund_type: fund.fund_type.clone(),
            fund_subtype: fund.fund_subtype.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedHolding {
    pub instrument_name: String,
    pub instrument_isin: Option<String>,
    pub sector: Option<String>,
    pub fund1_weight: f64,
    pub fund2_weight: f64,
    pub overlap_weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairOverlap {
    pub fund1_isin: String,
    pub fund2_isin: String,
    pub overlap_by_count_percentage: f64,
    pub overlap_by_weight_percentage: f64,
    pub common_holdings_count: usize,
    pub fund1_total_holdings: usize,
    pub fund2_total_holdings: usize,
    pub common_holdings: Vec<SharedHolding>,
    pub overlap_grade: &'static str,
}

pub fn pair_overlap(a: &FundHoldings, b: &FundHoldings) -> PairOverlap {
    let left = keyed(&a.holdings);
    let right = keyed(&b.holdings);
    let mut shared: Vec<SharedHolding> = left
        .iter()
        .filter_map(|(key, h1)| {
            right.get(key).map(|h2| SharedHolding {
                instrument_name: h1.instrument_name.clone(),
                instrument_isin: h1.instrument_isin.clone(),
                sector: h1.sector.clone(),
                fund1_weight: h1.percentage_to_nav,
                fund2_weight: h2.percentage_to_nav,
                overlap_weight: h1.percentage_to_nav.min(h2.percentage_to_nav),
            })
        })
        .collect();
    let largest = left.len().max(right.len());
    let by_count = if largest == 0 {
        0.0
    } else {
        shared.len() as f64 / largest as f64 * 100.0
    };
    let by_weight: f64 = shared.iter().map(|s| s.overlap_weight).sum();
    shared.sort_by(|x, y| y.overlap_weight.total_cmp(&x.overlap_weight));
    let common_holdings_count = shared.len();
    shared.truncate(TOP_PAIR_HOLDINGS);

    PairOverlap {
        fund1_isin: a.fund.isin.clone(),
        fund2_isin: b.fund.isin.clone(),
        overlap_by_count_percentage: by_count,
        overlap_by_weight_percentage: by_weight,
        common_holdings_count,
        fund1_total_holdings: left.len(),
        fund2_total_holdings: right.len(),
        common_holdings: shared,
        overlap_grade: overlap_grade(by_count, by_weight),
    }
}

/// Every unordered pair, in input order.
pub fn pairwise_overlap(funds: &[FundHoldings]) -> Vec<PairOverlap> {
    let mut pairs = Vec::new();
    for (i, a) in funds.iter().enumerate() {
        for b in &funds[i + 1..] {
            pairs.push(pair_overlap(a, b));
        }
    }
    pairs
}

#[derive(Debug, Clone, Serialize)]
pub struct FundOverlapCount {
    pub fund_isin: String,
    pub overlap_instruments: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallOverlap {
    pub total_unique_instruments: usize,
    pub common_instruments_count: usize,
    pub overlap_percentage: f64,
    pub funds_with_most_overlap: Vec<FundOverlapCount>,
    pub overlap_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentDetails {
    pub name: String,
    pub isin: Option<String>,
    pub sector: Option<String>,
    pub instrument_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FundWeight {
    pub fund_isin: String,
    pub weight: f64,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommonHolding {
    pub key: String,
    pub details: InstrumentDetails,
    pub present_in_funds: usize,
    pub fund_weights: Vec<FundWeight>,
    pub average_weight: f64,
    pub total_weight: f64,
    pub weight_variance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommonBrief {
    pub key: String,
    pub name: String,
    pub average_weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommonHoldings {
    pub total_common_holdings: usize,
    pub holdings_in_all_funds: usize,
    pub top_common_holdings: Vec<CommonHolding>,
    pub common_by_fund_count: BTreeMap<usize, Vec<CommonBrief>>,
}

/// Instruments in first-seen order with the funds that hold them.
struct InstrumentMap<'a> {
    order: Vec<String>,
    entries: BTreeMap<String, (&'a Holding, Vec<FundWeight>)>,
}

impl<'a> InstrumentMap<'a> {
    fn build(funds: &'a [FundHoldings]) -> Self {
        let mut order = Vec::new();
        let mut entries: BTreeMap<String, (&'a Holding, Vec<FundWeight>)> = BTreeMap::new();
        for fund in funds {
            // Per-fund key map so a fund is counted once per instrument.
            let mut seen: Vec<(String, &'a Holding)> = Vec::new();
            let mut index: BTreeMap<String, usize> = BTreeMap::new();
            for holding in &fund.holdings {
                let Some(key) = instrument_key(holding) else {
                    continue;
                };
                match index.get(&key) {
                    Some(&pos) => seen[pos].1 = holding,
                    None => {
                        index.insert(key.clone(), seen.len());
                        seen.push((key, holding));
                    }
                }
            }
            for (key, holding) in seen {
                let weight = FundWeight {
                    fund_isin: fund.fund.isin.clone(),
                    weight: holding.percentage_to_nav,
                    value: holding.value,
                };
                match entries.get_mut(&key) {
                    Some((_, weights)) => weights.push(weight),
                    None => {
                        order.push(key.clone());
                        entries.insert(key, (holding, vec![weight]));
                    }
                }
            }
        }
        Self { order, entries }
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &(&'a Holding, Vec<FundWeight>))> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).map(|entry| (key, entry)))
    }
}

pub fn overall_overlap(funds: &[FundHoldings]) -> OverallOverlap {
    let instruments = InstrumentMap::build(funds);
    let total = instruments.order.len();
    let mut per_fund: Vec<(String, usize)> = funds.iter().map(|f| (f.fund.isin.clone(), 0)).collect();
    let mut distribution: BTreeMap<usize, usize> = BTreeMap::new();
    let mut common = 0;
    for (_, (_, weights)) in instruments.iter() {
        *distribution.entry(weights.len()).or_default() += 1;
        if weights.len() > 1 {
            common += 1;
            for w in weights {
                if let Some(slot) = per_fund.iter_mut().find(|(isin, _)| *isin == w.fund_isin) {
                    slot.1 += 1;
                }
            }
        }
    }
    per_fund.retain(|(_, count)| *count > 0);
    per_fund.sort_by(|a, b| b.1.cmp(&a.1));
    per_fund.truncate(TOP_OVERLAPPING_FUNDS);

    OverallOverlap {
        total_unique_instruments: total,
        common_instruments_count: common,
        overlap_percentage: if total == 0 {
            0.0
        } else {
            common as f64 / total as f64 * 100.0
        },
        funds_with_most_overlap: per_fund
            .into_iter()
            .map(|(fund_isin, overlap_instruments)| FundOverlapCount {
                fund_isin,
                overlap_instruments,
            })
            .collect(),
        overlap_distribution: (1..=funds.len())
            .map(|i| (format!("in_{i}_funds"), distribution.get(&i).copied().unwrap_or(0)))
            .collect(),
    }
}

pub fn common_holdings(funds: &[FundHoldings]) -> CommonHoldings {
    let instruments = InstrumentMap::build(funds);
    let mut common: Vec<CommonHolding> = instruments
        .iter()
        .filter(|(_, (_, weights))| weights.len() >= 2)
        .map(|(key, (holding, weights))| {
            let values: Vec<f64> = weights.iter().map(|w| w.weight).collect();
            let total_weight: f64 = values.iter().sum();
            CommonHolding {
                key: key.clone(),
                details: InstrumentDetails {
                    name: holding.instrument_name.clone(),
                    isin: holding.instrument_isin.clone(),
                    sector: holding.sector.clone(),
                    instrument_type: holding.instrument_type.clone(),
                },
                present_in_funds: weights.len(),
                fund_weights: weights.clone(),
                average_weight: total_weight / weights.len() as f64,
                total_weight,
                weight_variance: population_variance(&values).unwrap_or(0.0),
            }
        })
        .collect();

    let mut by_count: BTreeMap<usize, Vec<CommonBrief>> = BTreeMap::new();
    for holding in &common {
        by_count
            .entry(holding.present_in_funds)
            .or_default()
            .push(CommonBrief {
                key: holding.key.clone(),
                name: holding.details.name.clone(),
                average_weight: holding.average_weight,
            });
    }
    for group in by_count.values_mut() {
        group.sort_by(|a, b| b.average_weight.total_cmp(&a.average_weight));
    }

    common.sort_by(|a, b| {
        b.present_in_funds
            .cmp(&a.present_in_funds)
            .then(b.average_weight.total_cmp(&a.average_weight))
    });
    let total_common_holdings = common.len();
    let holdings_in_all_funds = common
        .iter()
        .filter(|h| h.present_in_funds == funds.len())
        .count();
    common.truncate(TOP_COMMON_HOLDINGS);

    CommonHoldings {
        total_common_holdings,
        holdings_in_all_funds,
        top_common_holdings: common,
        common_by_fund_count: by_count,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorWeights {
    pub fund1_weight: f64,
    pub fund2_weight: f64,
    pub overlap: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorPairOverlap {
    pub overlap_percentage: f64,
    pub sector_details: BTreeMap<String, SectorWeights>,
    pub common_sectors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorOverlap {
    pub total_sectors: usize,
    pub sector_list: Vec<String>,
    pub fund_sector_allocations: BTreeMap<String, BTreeMap<String, f64>>,
    /// Keyed `"<isin1>-<isin2>"`.
    pub sector_overlap_matrix: BTreeMap<String, SectorPairOverlap>,
    pub average_sector_overlap: f64,
}

/// Summed weight per non-empty sector.
pub fn sector_allocation(holdings: &[Holding]) -> BTreeMap<String, f64> {
    let mut sectors = BTreeMap::new();
    for holding in holdings {
        if let Some(sector) = holding.sector.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            *sectors.entry(sector.to_string()).or_insert(0.0) += holding.percentage_to_nav;
        }
    }
    sectors
}

fn sector_pair(left: &BTreeMap<String, f64>, right: &BTreeMap<String, f64>) -> SectorPairOverlap {
    let sectors: BTreeSet<&String> = left.keys().chain(right.keys()).collect();
    let mut total = 0.0;
    let mut details = BTreeMap::new();
    let mut common = 0;
    for sector in sectors {
        let w1 = left.get(sector).copied().unwrap_or(0.0);
        let w2 = right.get(sector).copied().unwrap_or(0.0);
        let overlap = w1.min(w2);
        total += overlap;
        if w1 > 0.0 && w2 > 0.0 {
            common += 1;
        }
        if w1 > 0.0 || w2 > 0.0 {
            details.insert(
                sector.clone(),
                SectorWeights {
                    fund1_weight: w1,
                    fund2_weight: w2,
                    overlap,
                },
            );
        }
    }
    SectorPairOverlap {
        overlap_percentage: total,
        sector_details: details,
        common_sectors: common,
    }
}

pub fn sector_overlap(funds: &[FundHoldings]) -> SectorOverlap {
    let allocations: Vec<(String, BTreeMap<String, f64>)> = funds
        .iter()
        .map(|f| (f.fund.isin.clone(), sector_allocation(&f.holdings)))
        .collect();
    let sectors: BTreeSet<String> = allocations
        .iter()
        .flat_map(|(_, alloc)| alloc.keys().cloned())
        .collect();
    let mut matrix = BTreeMap::new();
    for (i, (isin1, left)) in allocations.iter().enumerate() {
        for (isin2, right) in &allocations[i + 1..] {
            matrix.insert(format!("{isin1}-{isin2}"), sector_pair(left, right));
        }
    }
    let overlaps: Vec<f64> = matrix.values().map(|p: &SectorPairOverlap| p.overlap_percentage).collect();
    SectorOverlap {
        total_sectors: sectors.len(),
        sector_list: sectors.into_iter().collect(),
        average_sector_overlap: mean(&overlaps).unwrap_or(0.0),
        sector_overlap_matrix: matrix,
        fund_sector_allocations: allocations.into_iter().collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlapMatrix {
    pub matrix: BTreeMap<String, BTreeMap<String, f64>>,
    pub fund_order: Vec<String>,
    /// Mean of the off-diagonal cells.
    pub average_overlap: f64,
}

pub fn overlap_matrix(funds: &[FundHoldings], pairs: &[PairOverlap]) -> OverlapMatrix {
    let weight_between = |a: &str, b: &str| {
        pairs
            .iter()
            .find(|p| {
                (p.fund1_isin == a && p.fund2_isin == b) || (p.fund1_isin == b && p.fund2_isin == a)
            })
            .map(|p| p.overlap_by_weight_percentage)
            .unwrap_or(0.0)
    };
    let order: Vec<String> = funds.iter().map(|f| f.fund.isin.clone()).collect();
    let mut matrix = BTreeMap::new();
    let mut off_diagonal = Vec::new();
    for a in &order {
        let mut row = BTreeMap::new();
        for b in &order {
            let cell = if a == b {
                100.0
            } else {
                let w = weight_between(a, b);
                off_diagonal.push(w);
                w
            };
            row.insert(b.clone(), cell);
        }
        matrix.insert(a.clone(), row);
    }
    OverlapMatrix {
        matrix,
        fund_order: order,
        average_overlap: mean(&off_diagonal).unwrap_or(0.0),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreComponents {
    pub base_score: f64,
    pub overlap_penalty: f64,
    pub sector_bonus: f64,
    pub holding_bonus: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiversificationMetrics {
    pub average_overlap_percentage: f64,
    pub total_sectors: usize,
    pub total_unique_holdings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiversificationScore {
    pub diversification_score: f64,
    pub score_grade: &'static str,
    pub score_components: ScoreComponents,
    pub metrics: DiversificationMetrics,
}

pub fn diversification_score(funds: &[FundHoldings], pairs: &[PairOverlap]) -> DiversificationScore {
    let weights: Vec<f64> = pairs.iter().map(|p| p.overlap_by_weight_percentage).collect();
    let avg_overlap = mean(&weights).unwrap_or(0.0);
    let sectors: BTreeSet<&str> = funds
        .iter()
        .flat_map(|f| f.holdings.iter())
        .filter_map(|h| h.sector.as_deref().map(str::trim).filter(|s| !s.is_empty()))
        .collect();
    let total_holdings: usize = funds.iter().map(|f| f.holdings.len()).sum();

    let overlap_penalty = avg_overlap.min(50.0);
    let sector_bonus = (sectors.len() as f64 * 2.0).min(30.0);
    let holding_bonus = (total_holdings as f64 / 50.0).min(20.0);
    let score = (100.0 - overlap_penalty + sector_bonus + holding_bonus).clamp(0.0, 100.0);

    DiversificationScore {
        diversification_score: round2(score),
        score_grade: diversification_grade(score),
        score_components: ScoreComponents {
            base_score: 100.0,
            overlap_penalty: -overlap_penalty,
            sector_bonus,
            holding_bonus,
        },
        metrics: DiversificationMetrics {
            average_overlap_percentage: round2(avg_overlap),
            total_sectors: sectors.len(),
            total_unique_holdings: total_holdings,
        },
    }
}

pub fn overlap_recommendations(
    funds: &[FundHoldings],
    pairs: &[PairOverlap],
    average_sector_overlap: f64,
) -> Vec<String> {
    let weights: Vec<f64> = pairs.iter().map(|p| p.overlap_by_weight_percentage).collect();
    let avg_overlap = mean(&weights).unwrap_or(0.0);
    let mut notes = Vec::new();

    if avg_overlap > 40.0 {
        notes.push("HIGH OVERLAP WARNING: Average portfolio overlap exceeds 40%. Consider reducing fund count or choosing funds from different categories.".to_string());
    }
    let heavy_pairs = pairs
        .iter()
        .filter(|p| p.overlap_by_weight_percentage > 60.0)
        .count();
    if heavy_pairs > 0 {
        notes.push(format!(
            "Found {heavy_pairs} fund pairs with >60% overlap. Consider replacing one fund from each highly overlapping pair."
        ));
    }
    if average_sector_overlap > 50.0 {
        notes.push("High sector overlap detected. Consider adding funds from different sectors for better diversification.".to_string());
    }
    let fund_types: BTreeSet<&str> = funds.iter().map(|f| f.fund.fund_type.as_str()).collect();
    if fund_types.len() == 1 {
        notes.push("All funds are from the same category. Consider mixing equity, debt, and hybrid funds for better diversification.".to_string());
    }
    let amcs: BTreeSet<&str> = funds.iter().map(|f| f.fund.amc_name.as_str()).collect();
    if (amcs.len() as f64) < funds.len() as f64 / 2.0 {
        notes.push("High AMC concentration detected. Consider spreading investments across different fund houses.".to_string());
    }
    if avg_overlap < 25.0 {
        notes.push("GOOD DIVERSIFICATION: Portfolio shows good diversification with acceptable overlap levels.".to_string());
    }
    if funds.len() >= 3 && avg_overlap < 35.0 {
        notes.push("Well-balanced portfolio with multiple funds showing reasonable overlap.".to_string());
    }
    if notes.is_empty() {
        notes.push("Portfolio analysis complete. No specific recommendations at this time.".to_string());
    }
    notes
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlapReport {
    pub analysis_date: DateTime<Utc>,
    pub funds_analyzed: usize,
    pub fund_details: Vec<FundDetail>,
    pub overall_overlap: OverallOverlap,
    pub pairwise_overlap: Vec<PairOverlap>,
    pub common_holdings: CommonHoldings,
    pub sector_overlap: SectorOverlap,
    pub overlap_matrix: OverlapMatrix,
    pub diversification_score: DiversificationScore,
    pub recommendations: Vec<String>,
}

pub const TOO_FEW_FUNDS: &str = "At least 2 funds required for overlap analysis";

pub fn analyze_overlap(funds: &[FundHoldings], analysis_date: DateTime<Utc>) -> Result<OverlapReport, ReportError> {
    if funds.len() < 2 {
        return Err(ReportError::Invalid(TOO_FEW_FUNDS.to_string()));
    }
    if funds.iter().all(|f| f.holdings.is_empty()) {
        return Err(ReportError::NotFound(
            "No portfolio holdings data available".to_string(),
        ));
    }
    let pairs = pairwise_overlap(funds);
    let sectors = sector_overlap(funds);
    Ok(OverlapReport {
        analysis_date,
        funds_analyzed: funds.len(),
        fund_details: funds.iter().map(|f| FundDetail::from(&f.fund)).collect(),
        overall_overlap: overall_overlap(funds),
        common_holdings: common_holdings(funds),
        overlap_matrix: overlap_matrix(funds, &pairs),
        diversification_score: diversification_score(funds, &pairs),
        recommendations: overlap_recommendations(funds, &pairs, sectors.average_sector_overlap),
        sector_overlap: sectors,
        pairwise_overlap: pairs,
    })
}
