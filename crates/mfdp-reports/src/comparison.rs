//! Side-by-side comparison of a handful of funds.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use mfdp_core::{FactSheet, Fund, FundRating, FundReturns, RiskMetrics};
use serde::Serialize;

use crate::overlap::{pairwise_overlap, FundHoldings};
use crate::{mean, population_std, recommendation_grade, round2, ReportError};

pub const TOO_FEW_FUNDS: &str = "At least 2 funds required for comparison";
const TOO_FEW_KNOWN_FUNDS: &str = "At least 2 known funds required for comparison";

const MIN_CONSISTENCY_POINTS: usize = 3;
const TIERED_WEIGHTS: [f64; 4] = [40.0, 30.0, 20.0, 10.0];

#[derive(Debug, Clone)]
pub struct ComparisonFund {
    pub fund: Fund,
    pub factsheet: Option<FactSheet>,
    pub returns: Option<FundReturns>,
    pub risk: Option<RiskMetrics>,
    pub ratings: Vec<FundRating>,
}

impl ComparisonFund {
    fn return_for(&self, pick: fn(&FundReturns) -> Option<f64>) -> Option<f64> {
        self.returns.as_ref().and_then(pick)
    }

    fn expense_ratio(&self) -> Option<f64> {
        self.factsheet.as_ref().and_then(|s| s.expense_ratio)
    }

    fn sharpe(&self) -> Option<f64> {
        self.risk.as_ref().and_then(|r| r.sharpe_ratio)
    }

    fn standard_deviation(&self) -> Option<f64> {
        self.risk.as_ref().and_then(|r| r.standard_deviation)
    }

    fn average_rating(&self) -> Option<f64> {
        let values: Vec<f64> = self.ratings.iter().filter_map(|r| r.rating_numeric).collect();
        mean(&values)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FundSummary {
    pub isin: String,
    pub name: String,
    pub amc: String,
    pub fund_type: String,
    pub fund_subtype: Option<String>,
    pub aum: Option<f64>,
    pub expense_ratio: Option<f64>,
    pub fund_manager: Option<String>,
    pub launch_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyMetrics {
    pub isin: String,
    pub return_1y: Option<f64>,
    pub return_3y: Option<f64>,
    pub return_5y: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub standard_deviation: Option<f64>,
    pub maximum_drawdown: Option<f64>,
    pub expense_ratio: Option<f64>,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BestValue {
    pub isin: String,
    pub value: f64,
}

/// Unweighted 0-100 inputs to the composite.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ScoreComponents {
    pub performance: f64,
    pub risk: f64,
    pub cost: f64,
    pub rating: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositeScore {
    pub isin: String,
    pub scheme_name: String,
    pub score: f64,
    pub grade: &'static str,
    pub components: ScoreComponents,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ranked {
    pub rank: usize,
    pub isin: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Rankings {
    pub performance: Vec<Ranked>,
    pub cost: Vec<Ranked>,
    pub composite: Vec<Ranked>,
    /// Per return period, highest first.
    pub by_period: BTreeMap<&'static str, Vec<Ranked>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyEntry {
    pub isin: String,
    pub coefficient_of_variation: f64,
    pub consistency_grade: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostEfficiency {
    pub average_expense_ratio: f64,
    pub lowest_expense_ratio: f64,
    pub highest_expense_ratio: f64,
    pub expense_ratio_range: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pick {
    pub category: &'static str,
    pub isin: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Winner {
    pub isin: String,
    pub score: f64,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Allocation {
    pub strategy: &'static str,
    pub suggested_allocation: BTreeMap<String, f64>,
    pub rebalancing_frequency: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairBrief {
    pub fund1_isin: String,
    pub fund2_isin: String,
    pub overlap_by_weight_percentage: f64,
    pub overlap_grade: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverlapSummary {
    pub average_overlap: f64,
    pub pairs: Vec<PairBrief>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FundComparison {
    pub comparison_date: DateTime<Utc>,
    pub funds_count: usize,
    pub fund_summaries: Vec<FundSummary>,
    pub key_metrics: Vec<KeyMetrics>,
    pub best_performers: BTreeMap<&'static str, BestValue>,
    pub composite_scores: Vec<CompositeScore>,
    pub rankings: Rankings,
    pub consistency_analysis: Vec<ConsistencyEntry>,
    pub cost_efficiency: Option<CostEfficiency>,
    pub recommendations: Vec<Pick>,
    pub overall_winner: Option<Winner>,
    pub strategy_advice: Vec<String>,
    pub allocation: Allocation,
    pub overlap_summary: Option<OverlapSummary>,
}

pub fn score_components(fund: &ComparisonFund) -> ScoreComponents {
    ScoreComponents {
        performance: fund
            .return_for(|r| r.return_1y)
            .map_or(0.0, |r| (r * 2.0).clamp(0.0, 100.0)),
        risk: fund.sharpe().map_or(0.0, |s| (s * 20.0).clamp(0.0, 100.0)),
        cost: fund
            .expense_ratio()
            .map_or(0.0, |er| (100.0 - er * 50.0).clamp(0.0, 100.0)),
        rating: fund.average_rating().map_or(0.0, |r| r / 5.0 * 100.0),
    }
}

pub fn composite_score(components: &ScoreComponents) -> f64 {
    0.4 * components.performance + 0.3 * components.risk + 0.2 * components.cost + 0.1 * components.rating
}

/// `0.4·1y + 0.4·3y + 0.2·5y`, skipping gaps. `None` without a returns row.
pub fn performance_score(returns: Option<&FundReturns>) -> Option<f64> {
    let r = returns?;
    Some(
        [(r.return_1y, 0.4), (r.return_3y, 0.4), (r.return_5y, 0.2)]
            .into_iter()
            .filter_map(|(value, weight)| value.map(|v| v * weight))
            .sum(),
    )
}

pub fn consistency_grade(cv: f64) -> &'static str {
    if cv < 50.0 {
        "High"
    } else if cv < 100.0 {
        "Medium"
    } else {
        "Low"
    }
}

fn ranked(rows: Vec<(String, Option<f64>)>) -> Vec<Ranked> {
    rows.into_iter()
        .enumerate()
        .map(|(i, (isin, value))| Ranked {
            rank: i + 1,
            isin,
            value,
        })
        .collect()
}

/// Highest-first ranking over present values; stable on ties.
fn rank_desc(funds: &[ComparisonFund], value: impl Fn(&ComparisonFund) -> Option<f64>) -> Vec<Ranked> {
    let mut rows: Vec<(String, f64)> = funds
        .iter()
        .filter_map(|f| value(f).map(|v| (f.fund.isin.clone(), v)))
        .collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked(rows.into_iter().map(|(isin, v)| (isin, Some(v))).collect())
}

/// Expense ratio ascending, funds without one trailing in input order.
pub fn cost_ranking(funds: &[ComparisonFund]) -> Vec<Ranked> {
    let mut rows: Vec<(String, Option<f64>)> = funds
        .iter()
        .map(|f| (f.fund.isin.clone(), f.expense_ratio()))
        .collect();
    rows.sort_by(|a, b| match (a.1, b.1) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    ranked(rows)
}

/// First fund holding the extreme value; `lowest` flips the direction.
fn extreme<'a>(
    funds: &'a [ComparisonFund],
    value: impl Fn(&ComparisonFund) -> Option<f64>,
    lowest: bool,
) -> Option<(&'a ComparisonFund, f64)> {
    let mut best: Option<(&ComparisonFund, f64)> = None;
    for fund in funds {
        let Some(v) = value(fund) else { continue };
        let better = match best {
            None => true,
            Some((_, current)) if lowest => v < current,
            Some((_, current)) => v > current,
        };
        if better {
            best = Some((fund, v));
        }
    }
    best
}

pub fn consistency_analysis(funds: &[ComparisonFund]) -> Vec<ConsistencyEntry> {
    funds
        .iter()
        .filter_map(|f| {
            let values = f.returns.as_ref()?.short_horizon();
            if values.len() < MIN_CONSISTENCY_POINTS {
                return None;
            }
            let avg = mean(&values)?;
            if avg == 0.0 {
                return None;
            }
            let cv = population_std(&values)? / avg.abs() * 100.0;
            Some(ConsistencyEntry {
                isin: f.fund.isin.clone(),
                coefficient_of_variation: round2(cv),
                consistency_grade: consistency_grade(cv),
            })
        })
        .collect()
}

pub fn cost_efficiency(funds: &[ComparisonFund]) -> Option<CostEfficiency> {
    let ratios: Vec<f64> = funds.iter().filter_map(ComparisonFund::expense_ratio).collect();
    let average = mean(&ratios)?;
    let lowest = ratios.iter().copied().fold(f64::MAX, f64::min);
    let highest = ratios.iter().copied().fold(f64::MIN, f64::max);
    Some(CostEfficiency {
        average_expense_ratio: round2(average),
        lowest_expense_ratio: lowest,
        highest_expense_ratio: highest,
        expense_ratio_range: round2(highest - lowest),
    })
}

pub fn strategy_advice(funds: &[ComparisonFund]) -> Vec<String> {
    let mut advice = Vec::new();
    let types: BTreeSet<&str> = funds.iter().map(|f| f.fund.fund_type.as_str()).collect();
    if types.len() == 1 {
        advice.push("Consider diversifying across different fund types (equity, debt, hybrid) for balanced risk.".to_string());
    }
    let amcs: BTreeSet<&str> = funds.iter().map(|f| f.fund.amc_name.as_str()).collect();
    if (amcs.len() as f64) < funds.len() as f64 / 2.0 {
        advice.push("Consider spreading investments across different AMCs to reduce concentration risk.".to_string());
    }
    let long_term = funds
        .iter()
        .any(|f| f.return_for(|r| r.return_1y).is_some() || f.return_for(|r| r.return_5y).is_some());
    if long_term {
        advice.push("Focus on long-term performers for better wealth creation over time.".to_string());
    }
    advice
}

/// Even split for pairs, tiered weights for three or four funds, even split beyond.
pub fn suggested_allocation(funds: &[ComparisonFund], performance: &[Ranked]) -> Allocation {
    let count = funds.len();
    let equal = |weight: f64| -> BTreeMap<String, f64> {
        funds.iter().map(|f| (f.fund.isin.clone(), weight)).collect()
    };
    let (strategy, suggested_allocation) = match count {
        0..=2 => ("Equal-weighted", equal(50.0)),
        3..=4 => (
            "Performance-weighted",
            performance
                .iter()
                .zip(TIERED_WEIGHTS)
                .map(|(r, weight)| (r.isin.clone(), weight))
                .collect(),
        ),
        _ => ("Equal-weighted", equal(round2(100.0 / count as f64))),
    };
    Allocation {
        strategy,
        suggested_allocation,
        rebalancing_frequency: "Quarterly",
    }
}

fn overlap_summary(holdings: &[FundHoldings]) -> Option<OverlapSummary> {
    if holdings.iter().filter(|h| !h.holdings.is_empty()).count() < 2 {
        return None;
    }
    let pairs = pairwise_overlap(holdings);
    let weights: Vec<f64> = pairs.iter().map(|p| p.overlap_by_weight_percentage).collect();
    Some(OverlapSummary {
        average_overlap: round2(mean(&weights).unwrap_or(0.0)),
        pairs: pairs
            .into_iter()
            .map(|p| PairBrief {
                fund1_isin: p.fund1_isin,
                fund2_isin: p.fund2_isin,
                overlap_by_weight_percentage: round2(p.overlap_by_weight_percentage),
                overlap_grade: p.overlap_grade,
            })
            .collect(),
    })
}

pub fn compare_funds(
    funds: &[ComparisonFund],
    holdings: &[FundHoldings],
    comparison_date: DateTime<Utc>,
) -> Result<FundComparison, ReportError> {
    if funds.len() < 2 {
        return Err(ReportError::Invalid(TOO_FEW_KNOWN_FUNDS.to_string()));
    }

    let mut composite_scores: Vec<CompositeScore> = funds
        .iter()
        .map(|f| {
            let components = score_components(f);
            let score = composite_score(&components);
            CompositeScore {
                isin: f.fund.isin.clone(),
                scheme_name: f.fund.scheme_name.clone(),
                score: round2(score),
                grade: recommendation_grade(score),
                components,
            }
        })
        .collect();
    composite_scores.sort_by(|a, b| b.score.total_cmp(&a.score));

    let performance = rank_desc(funds, |f| performance_score(f.returns.as_ref()).map(round2));
    let periods: [(&'static str, fn(&FundReturns) -> Option<f64>); 7] = [
        ("return_1m", |r| r.return_1m),
        ("return_3m", |r| r.return_3m),
        ("return_6m", |r| r.return_6m),
        ("return_ytd", |r| r.return_ytd),
        ("return_1y", |r| r.return_1y),
        ("return_3y", |r| r.return_3y),
        ("return_5y", |r| r.return_5y),
    ];
    let by_period = periods
        .iter()
        .map(|(name, pick)| (*name, rank_desc(funds, |f| f.return_for(*pick))))
        .filter(|(_, rows)| !rows.is_empty())
        .collect();

    let mut best_performers = BTreeMap::new();
    for (name, pick) in periods.iter().filter(|(n, _)| ["return_1y", "return_3y", "return_5y"].contains(n)) {
        if let Some((fund, value)) = extreme(funds, |f| f.return_for(*pick), false) {
            best_performers.insert(*name, BestValue { isin: fund.fund.isin.clone(), value });
        }
    }
    if let Some((fund, value)) = extreme(funds, |f| f.factsheet.as_ref().and_then(|s| s.aum), false) {
        best_performers.insert("aum", BestValue { isin: fund.fund.isin.clone(), value });
    }

    let mut recommendations = Vec::new();
    if let Some(leader) = performance.first() {
        recommendations.push(Pick {
            category: "Performance Leader",
            isin: leader.isin.clone(),
            reason: "Best overall performance across multiple time periods",
        });
    }
    let picks: [(&'static str, &'static str, fn(&ComparisonFund) -> Option<f64>, bool); 3] = [
        ("Risk-Adjusted Winner", "Best risk-adjusted returns (Sharpe ratio)", ComparisonFund::sharpe, false),
        ("Cost Efficient", "Lowest expense ratio with decent performance", ComparisonFund::expense_ratio, true),
        ("Conservative Choice", "Lowest volatility and drawdown risk", ComparisonFund::standard_deviation, true),
    ];
    for (category, reason, value, lowest) in picks {
        if let Some((fund, _)) = extreme(funds, value, lowest) {
            recommendations.push(Pick {
                category,
                isin: fund.fund.isin.clone(),
                reason,
            });
        }
    }

    let overall_winner = composite_scores.first().map(|top| Winner {
        isin: top.isin.clone(),
        score: top.score,
        reason: "Best overall score considering performance, risk, and cost factors",
    });

    Ok(FundComparison {
        comparison_date,
        funds_count: funds.len(),
        fund_summaries: funds
            .iter()
            .map(|f| FundSummary {
                isin: f.fund.isin.clone(),
                name: f.fund.scheme_name.clone(),
                amc: f.fund.amc_name.clone(),
                fund_type: f.fund.fund_type.clone(),
                fund_subtype: f.fund.fund_subtype.clone(),
                aum: f.factsheet.as_ref().and_then(|s| s.aum),
                expense_ratio: f.expense_ratio(),
                fund_manager: f.factsheet.as_ref().and_then(|s| s.fund_manager.clone()),
                launch_date: f.factsheet.as_ref().and_then(|s| s.launch_date),
            })
            .collect(),
        key_metrics: funds
            .iter()
            .map(|f| KeyMetrics {
                isin: f.fund.isin.clone(),
                return_1y: f.return_for(|r| r.return_1y),
                return_3y: f.return_for(|r| r.return_3y),
                return_5y: f.return_for(|r| r.return_5y),
                sharpe_ratio: f.sharpe(),
                standard_deviation: f.standard_deviation(),
                maximum_drawdown: f.risk.as_ref().and_then(|r| r.maximum_drawdown),
                expense_ratio: f.expense_ratio(),
                average_rating: f.average_rating().map(round2),
            })
            .collect(),
        best_performers,
        rankings: Rankings {
            cost: cost_ranking(funds),
            composite: ranked(
                composite_scores
                    .iter()
                    .map(|c| (c.isin.clone(), Some(c.score)))
                    .collect(),
            ),
            by_period,
            performance: performance.clone(),
        },
        composite_scores,
        consistency_analysis: consistency_analysis(funds),
        cost_efficiency: cost_efficiency(funds),
        recommendations,
        overall_winner,
        strategy_advice: strategy_advice(funds),
        allocation: suggested_allocation(funds, &performance),
        overlap_summary: overlap_summary(holdings),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::test_support::{fund, holding, returns};

    fn entry(isin: &str, amc: &str, r1y: f64, sharpe: Option<f64>, expense: Option<f64>) -> ComparisonFund {
        ComparisonFund {
            fund: fund(isin, "Equity", amc),
            factsheet: expense.map(|er| FactSheet {
                isin: isin.to_string(),
                fund_manager: None,
                aum: Some(1000.0),
                expense_ratio: Some(er),
                launch_date: None,
                exit_load: None,
                last_updated: Utc::now(),
            }),
            returns: Some(returns(isin, 1.0, 2.0, 3.0, r1y, 10.0, 12.0)),
            risk: sharpe.map(|s| RiskMetrics {
                isin: isin.to_string(),
                sharpe_ratio: Some(s),
                standard_deviation: Some(10.0 + s),
                ..RiskMetrics::default()
            }),
            ratings: Vec::new(),
        }
    }

    #[test]
    fn composite_weights_each_component() {
        let mut f = entry("INF000000001", "Alpha", 20.0, Some(1.5), Some(1.0));
        f.ratings.push(FundRating {
            isin: "INF000000001".into(),
            rating_agency: "CRISIL".into(),
            rating_value: Some("4 Star".into()),
            rating_numeric: Some(4.0),
            rating_outlook: None,
            rating_date: None,
            is_current: true,
        });
        let c = score_components(&f);
        assert_eq!(
            c,
            ScoreComponents {
                performance: 40.0,
                risk: 30.0,
                cost: 50.0,
                rating: 80.0
            }
        );
        assert!((composite_score(&c) - 43.0).abs() < 1e-9);
    }

    #[test]
    fn missing_inputs_contribute_nothing() {
        let mut f = entry("INF000000001", "Alpha", 80.0, None, None);
        f.returns = None;
        assert_eq!(composite_score(&score_components(&f)), 0.0);
        assert_eq!(performance_score(None), None);
    }

    #[test]
    fn cost_ranking_puts_missing_ratios_last() {
        let funds = vec![
            entry("INF000000001", "Alpha", 10.0, None, None),
            entry("INF000000002", "Beta", 10.0, None, Some(1.5)),
            entry("INF000000003", "Gamma", 10.0, None, Some(0.5)),
        ];
        let isins: Vec<String> = cost_ranking(&funds).into_iter().map(|r| r.isin).collect();
        assert_eq!(isins, vec!["INF000000003", "INF000000002", "INF000000001"]);
    }

    #[test]
    fn allocation_depends_on_fund_count() {
        let two = vec![
            entry("INF000000001", "Alpha", 10.0, None, None),
            entry("INF000000002", "Beta", 20.0, None, None),
        ];
        let alloc = suggested_allocation(&two, &[]);
        assert_eq!(alloc.suggested_allocation["INF000000001"], 50.0);

        let three = vec![
            entry("INF000000001", "Alpha", 10.0, None, None),
            entry("INF000000002", "Beta", 30.0, None, None),
            entry("INF000000003", "Gamma", 20.0, None, None),
        ];
        let perf = rank_desc(&three, |f| performance_score(f.returns.as_ref()));
        let alloc = suggested_allocation(&three, &perf);
        assert_eq!(alloc.strategy, "Performance-weighted");
        assert_eq!(alloc.suggested_allocation["INF000000002"], 40.0);
        assert_eq!(alloc.suggested_allocation["INF000000003"], 30.0);
        assert_eq!(alloc.suggested_allocation["INF000000001"], 20.0);

        let five: Vec<ComparisonFund> = (1..=5)
            .map(|i| entry(&format!("INF00000000{i}"), "Alpha", 10.0, None, None))
            .collect();
        let alloc = suggested_allocation(&five, &[]);
        assert_eq!(alloc.strategy, "Equal-weighted");
        assert_eq!(alloc.suggested_allocation["INF000000005"], 20.0);
        assert_eq!(alloc.rebalancing_frequency, "Quarterly");
    }

    #[test]
    fn comparison_picks_winners_and_summarises_overlap() {
        let funds = vec![
            entry("INF000000001", "Alpha", 25.0, Some(0.8), Some(1.2)),
            entry("INF000000002", "Alpha", 12.0, Some(1.4), Some(0.4)),
        ];
        let holdings = vec![
            FundHoldings {
                fund: funds[0].fund.clone(),
                holdings: vec![holding("INF000000001", "X", 10.0, None)],
            },
            FundHoldings {
                fund: funds[1].fund.clone(),
                holdings: vec![holding("INF000000002", "X", 6.0, None)],
            },
        ];
        let report = compare_funds(&funds, &holdings, Utc::now()).unwrap();

        assert_eq!(report.rankings.performance[0].isin, "INF000000001");
        let by_category: BTreeMap<&str, &str> = report
            .recommendations
            .iter()
            .map(|p| (p.category, p.isin.as_str()))
            .collect();
        assert_eq!(by_category["Performance Leader"], "INF000000001");
        assert_eq!(by_category["Risk-Adjusted Winner"], "INF000000002");
        assert_eq!(by_category["Cost Efficient"], "INF000000002");
        assert_eq!(by_category["Conservative Choice"], "INF000000001");
        assert_eq!(report.best_performers["return_1y"].value, 25.0);
        assert_eq!(
            report.overall_winner.as_ref().map(|w| w.isin.as_str()),
            Some(report.composite_scores[0].isin.as_str())
        );
        assert_eq!(report.overlap_summary.as_ref().unwrap().average_overlap, 6.0);
        assert_eq!(report.cost_efficiency.as_ref().unwrap().expense_ratio_range, 0.8);
        assert!(report.strategy_advice[0].starts_with("Consider diversifying"));
        // One AMC across two funds is not below half the fund count.
        assert_eq!(report.strategy_advice.len(), 2);
        assert!(report.strategy_advice[1].starts_with("Focus on long-term"));
    }

    #[test]
    fn consistency_needs_three_short_horizon_points() {
        let mut f = entry("INF000000001", "Alpha", 4.0, None, None);
        let analysis = consistency_analysis(std::slice::from_ref(&f));
        // [1, 2, 3, 4]: std sqrt(1.25) over mean 2.5
        assert_eq!(analysis[0].coefficient_of_variation, round2(1.25_f64.sqrt() / 2.5 * 100.0));
        assert_eq!(analysis[0].consistency_grade, "High");

        if let Some(r) = f.returns.as_mut() {
            r.return_3m = None;
            r.return_6m = None;
        }
        assert!(consistency_analysis(&[f]).is_empty());
    }

    #[test]
    fn single_known_fund_is_rejected() {
        let funds = vec![entry("INF000000001", "Alpha", 4.0, None, None)];
        assert!(matches!(
            compare_funds(&funds, &[], Utc::now()),
            Err(ReportError::Invalid(_))
        ));
    }
}
