//! Single-fund analytics report.
//!
//! Everything here is a pure function of the rows handed in through
//! [`AnalyticsInput`]; the caller decides what "today" is.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use mfdp_core::{FactSheet, FlowStatistics, Fund, FundRating, FundReturns, Holding, NavPoint, RiskMetrics};
use serde::Serialize;

use crate::overlap::sector_allocation;
use crate::{mean, population_std, recommendation_grade, round2};

const NAV_WINDOW_DAYS: i64 = 365;
const TREND_SAMPLE: usize = 10;
const MIN_NAV_RISK_POINTS: usize = 20;
const NAV_RISK_POINTS: usize = 252;
const TOP_HOLDINGS: usize = 10;
const TOP_SECTORS: usize = 10;
const TOP_PEERS: usize = 5;

#[derive(Debug, Clone)]
pub struct PeerFund {
    pub fund: Fund,
    pub returns: Option<FundReturns>,
}

/// Rows feeding one report. `nav` is oldest first.
#[derive(Debug, Clone)]
pub struct AnalyticsInput {
    pub fund: Fund,
    pub factsheet: Option<FactSheet>,
    pub returns: Option<FundReturns>,
    pub holdings: Vec<Holding>,
    pub nav: Vec<NavPoint>,
    pub ratings: Vec<FundRating>,
    pub risk: Option<RiskMetrics>,
    pub flows: Option<FlowStatistics>,
    pub peers: Vec<PeerFund>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BasicInfo {
    pub isin: String,
    pub scheme_name: String,
    pub fund_type: String,
    pub fund_subtype: Option<String>,
    pub amc_name: String,
    pub fund_manager: Option<String>,
    pub aum: Option<f64>,
    pub expense_ratio: Option<f64>,
    pub launch_date: Option<NaiveDate>,
    pub exit_load: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub returns: Option<FundReturns>,
    pub volatility: &'static str,
    pub consistency_score: f64,
}

/// Fallback risk figures computed from daily NAV changes.
#[derive(Debug, Clone, Serialize)]
pub struct NavRisk {
    pub standard_deviation: f64,
    pub maximum_drawdown: f64,
    pub average_return: f64,
    pub data_period_days: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAnalysis {
    pub metrics: Option<RiskMetrics>,
    pub nav_based: Option<NavRisk>,
    pub risk_grade: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopHolding {
    pub name: String,
    pub percentage: f64,
    pub sector: Option<String>,
    pub instrument_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetAllocation {
    pub equity: Option<f64>,
    pub debt: Option<f64>,
    pub cash: Option<f64>,
    pub other: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioComposition {
    pub total_holdings: usize,
    pub top_holdings: Vec<TopHolding>,
    pub top_10_concentration: f64,
    pub diversification_score: f64,
    pub asset_allocation: Option<AssetAllocation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorWeight {
    pub sector: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorAllocationSummary {
    pub sectors: BTreeMap<String, f64>,
    pub sector_count: usize,
    pub top_sectors: Vec<SectorWeight>,
    pub sector_diversification_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerPerformance {
    pub isin: String,
    pub scheme_name: String,
    pub return_1y: Option<f64>,
    pub return_3y: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerComparison {
    pub category: String,
    pub total_peers_analyzed: usize,
    pub fund_rank_1y: Option<usize>,
    pub fund_rank_3y: Option<usize>,
    pub percentile_1y: Option<f64>,
    pub category_average_1y: Option<f64>,
    pub category_average_3y: Option<f64>,
    pub top_performers: Vec<PeerPerformance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowAnalysis {
    pub statistics: Option<FlowStatistics>,
    pub flow_trend: &'static str,
    pub investor_sentiment: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingEntry {
    pub value: Option<String>,
    pub numeric: Option<f64>,
    pub outlook: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RatingSummary {
    pub total_ratings: usize,
    pub average_rating: Option<f64>,
    pub ratings_by_agency: BTreeMap<String, Vec<RatingEntry>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavTrends {
    pub current_nav: f64,
    #[serde(rename = "52_week_high")]
    pub high_52_week: f64,
    #[serde(rename = "52_week_low")]
    pub low_52_week: f64,
    pub window_return: f64,
    pub nav_volatility: Option<f64>,
    pub trend: &'static str,
    pub max_drawdown: f64,
    pub data_points: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub score: f64,
    pub grade: &'static str,
    pub strengths: Vec<&'static str>,
    pub concerns: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FundAnalytics {
    pub isin: String,
    pub generated_at: DateTime<Utc>,
    pub basic_info: BasicInfo,
    pub performance_metrics: PerformanceMetrics,
    pub risk_analysis: RiskAnalysis,
    pub portfolio_composition: PortfolioComposition,
    pub sector_allocation: SectorAllocationSummary,
    pub peer_comparison: PeerComparison,
    pub flow_analysis: FlowAnalysis,
    pub rating_summary: RatingSummary,
    pub nav_trends: Option<NavTrends>,
    pub recommendation: Recommendation,
}

pub fn volatility_label(returns: &FundReturns) -> &'static str {
    let values = returns.short_horizon();
    if values.len() < 2 {
        return "Insufficient data";
    }
    match population_std(&values).unwrap_or(0.0) {
        std if std < 5.0 => "Low",
        std if std < 15.0 => "Moderate",
        _ => "High",
    }
}

/// 100 for perfectly even positive returns, falling 10 points per unit of spread.
pub fn consistency_score(returns: &FundReturns) -> f64 {
    let positives: Vec<f64> = returns.short_horizon().into_iter().filter(|r| *r > 0.0).collect();
    if positives.len() < 2 {
        return 0.0;
    }
    let std = population_std(&positives).unwrap_or(0.0);
    (100.0 - (std * 10.0).min(100.0)).max(0.0)
}

pub fn risk_grade(standard_deviation: Option<f64>) -> &'static str {
    match standard_deviation {
        None => "Unknown",
        Some(std) if std < 10.0 => "Low Risk",
        Some(std) if std < 20.0 => "Moderate Risk",
        Some(_) => "High Risk",
    }
}

/// Largest peak-to-trough fall, in percent, walking the series in order.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let Some(&first) = values.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut worst = 0.0_f64;
    for &value in &values[1..] {
        if value > peak {
            peak = value;
        } else if peak > 0.0 {
            worst = worst.max((peak - value) / peak * 100.0);
        }
    }
    worst
}

pub fn nav_risk(nav: &[NavPoint]) -> Option<NavRisk> {
    if nav.len() < MIN_NAV_RISK_POINTS {
        return None;
    }
    let recent: Vec<f64> = nav[nav.len().saturating_sub(NAV_RISK_POINTS)..]
        .iter()
        .map(|p| p.nav)
        .collect();
    let daily: Vec<f64> = recent
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .collect();
    Some(NavRisk {
        standard_deviation: round2(population_std(&daily).unwrap_or(0.0)),
        maximum_drawdown: round2(max_drawdown(&recent)),
        average_return: round2(mean(&daily).unwrap_or(0.0)),
        data_period_days: recent.len(),
    })
}

pub fn holdings_diversification(count: usize) -> f64 {
    match count {
        0..=9 => 20.0,
        10..=29 => 60.0,
        _ => 90.0,
    }
}

pub fn sector_diversification(sectors: &BTreeMap<String, f64>) -> f64 {
    if sectors.is_empty() {
        return 0.0;
    }
    if sectors.len() < 3 {
        return 20.0;
    }
    let largest = sectors.values().copied().fold(f64::MIN, f64::max);
    if largest > 50.0 {
        40.0
    } else if largest > 30.0 {
        70.0
    } else {
        90.0
    }
}

/// `1 + peers strictly ahead`; ties share the better rank.
pub fn peer_rank(value: Option<f64>, peers: &[f64]) -> Option<usize> {
    let value = value?;
    if peers.is_empty() {
        return None;
    }
    Some(1 + peers.iter().filter(|p| **p > value).count())
}

/// Share of peers strictly behind the fund, in percent.
pub fn peer_percentile(value: Option<f64>, peers: &[f64]) -> Option<f64> {
    let value = value?;
    if peers.is_empty() {
        return None;
    }
    let behind = peers.iter().filter(|p| **p < value).count();
    Some(round2(behind as f64 / peers.len() as f64 * 100.0))
}

pub fn nav_trend(window: &[f64]) -> &'static str {
    if window.len() < TREND_SAMPLE {
        return "Insufficient data";
    }
    let oldest = mean(&window[..TREND_SAMPLE]).unwrap_or(0.0);
    let latest = mean(&window[window.len() - TREND_SAMPLE..]).unwrap_or(0.0);
    if oldest == 0.0 {
        return "Insufficient data";
    }
    let change = (latest - oldest) / oldest * 100.0;
    if change > 5.0 {
        "Strong Uptrend"
    } else if change > 0.0 {
        "Uptrend"
    } else if change > -5.0 {
        "Sideways"
    } else {
        "Downtrend"
    }
}

/// Trends over the NAV points dated within a year of `as_of`.
pub fn nav_trends(nav: &[NavPoint], as_of: NaiveDate) -> Option<NavTrends> {
    let since = as_of - Duration::days(NAV_WINDOW_DAYS);
    let window: Vec<f64> = nav
        .iter()
        .filter(|p| p.date >= since && p.date <= as_of)
        .map(|p| p.nav)
        .collect();
    let (&first, &current) = (window.first()?, window.last()?);
    Some(NavTrends {
        current_nav: current,
        high_52_week: window.iter().copied().fold(f64::MIN, f64::max),
        low_52_week: window.iter().copied().fold(f64::MAX, f64::min),
        window_return: if first > 0.0 {
            round2((current - first) / first * 100.0)
        } else {
            0.0
        },
        nav_volatility: (window.len() > 1)
            .then(|| population_std(&window))
            .flatten()
            .map(round2),
        trend: nav_trend(&window),
        max_drawdown: round2(max_drawdown(&window)),
        data_points: window.len(),
    })
}

pub fn flow_trend(yearly_flow: Option<f64>) -> &'static str {
    match yearly_flow {
        None => "Data not available",
        Some(flow) if flow > 1000.0 => "Strong Inflows",
        Some(flow) if flow > 0.0 => "Positive Inflows",
        Some(flow) if flow > -500.0 => "Moderate Outflows",
        Some(_) => "Heavy Outflows",
    }
}

pub fn investor_sentiment(net_flow: Option<f64>) -> &'static str {
    let flow = net_flow.unwrap_or(0.0);
    if flow > 100.0 {
        "Very Positive"
    } else if flow > 0.0 {
        "Positive"
    } else if flow > -50.0 {
        "Neutral"
    } else {
        "Negative"
    }
}

pub fn recommendation_score(returns: Option<&FundReturns>, risk: Option<&RiskMetrics>) -> f64 {
    let mut score = 50.0;
    if let Some(returns) = returns {
        match returns.return_1y {
            Some(r) if r > 15.0 => score += 15.0,
            Some(r) if r > 10.0 => score += 10.0,
            Some(r) if r > 5.0 => score += 5.0,
            _ => {}
        }
        score += consistency_score(returns) / 100.0 * 20.0;
    }
    if let Some(risk) = risk {
        match risk.sharpe_ratio {
            Some(s) if s > 1.0 => score += 15.0,
            Some(s) if s > 0.5 => score += 10.0,
            _ => {}
        }
        match risk.maximum_drawdown {
            Some(d) if d < 10.0 => score += 10.0,
            Some(d) if d < 20.0 => score += 5.0,
            _ => {}
        }
    }
    score.clamp(0.0, 100.0)
}

pub fn strengths(returns: Option<&FundReturns>, risk: Option<&RiskMetrics>) -> Vec<&'static str> {
    let r1y = returns.and_then(|r| r.return_1y);
    let r3y = returns.and_then(|r| r.return_3y);
    let sharpe = risk.and_then(|r| r.sharpe_ratio);
    let alpha = risk.and_then(|r| r.alpha);
    let drawdown = risk.and_then(|r| r.maximum_drawdown);

    let mut out = Vec::new();
    if r1y.is_some_and(|r| r > 15.0) {
        out.push("Strong 1-year performance");
    }
    if r3y.is_some_and(|r| r > 12.0) {
        out.push("Consistent long-term returns");
    }
    if sharpe.is_some_and(|s| s > 1.0) {
        out.push("Excellent risk-adjusted returns");
    }
    if alpha.is_some_and(|a| a > 2.0) {
        out.push("Generates alpha over benchmark");
    }
    if drawdown.is_some_and(|d| d < 15.0) {
        out.push("Good downside protection");
    }
    if out.is_empty() {
        out.push("Performance analysis pending");
    }
    out
}

pub fn concerns(returns: Option<&FundReturns>, risk: Option<&RiskMetrics>) -> Vec<&'static str> {
    let r1y = returns.and_then(|r| r.return_1y);
    let r3y = returns.and_then(|r| r.return_3y);
    let std = risk.and_then(|r| r.standard_deviation);
    let drawdown = risk.and_then(|r| r.maximum_drawdown);
    let sharpe = risk.and_then(|r| r.sharpe_ratio);

    let mut out = Vec::new();
    if r1y.is_some_and(|r| r < 0.0) {
        out.push("Negative 1-year returns");
    }
    if let (Some(one), Some(three)) = (r1y, r3y) {
        if one < three / 3.0 {
            out.push("Recent performance deterioration");
        }
    }
    if std.is_some_and(|s| s > 25.0) {
        out.push("High volatility");
    }
    if drawdown.is_some_and(|d| d > 30.0) {
        out.push("High maximum drawdown");
    }
    if sharpe.is_some_and(|s| s < 0.0) {
        out.push("Poor risk-adjusted returns");
    }
    if out.is_empty() {
        out.push("No major concerns identified");
    }
    out
}

fn peer_comparison(fund: &Fund, returns: Option<&FundReturns>, peers: &[PeerFund]) -> PeerComparison {
    let with_returns: Vec<(&Fund, &FundReturns)> = peers
        .iter()
        .filter_map(|p| p.returns.as_ref().map(|r| (&p.fund, r)))
        .collect();
    let one_year: Vec<f64> = with_returns.iter().filter_map(|(_, r)| r.return_1y).collect();
    let three_year: Vec<f64> = with_returns.iter().filter_map(|(_, r)| r.return_3y).collect();
    let own_1y = returns.and_then(|r| r.return_1y);
    let own_3y = returns.and_then(|r| r.return_3y);

    PeerComparison {
        category: fund.fund_type.clone(),
        total_peers_analyzed: with_returns.len(),
        fund_rank_1y: peer_rank(own_1y, &one_year),
        fund_rank_3y: peer_rank(own_3y, &three_year),
        percentile_1y: peer_percentile(own_1y, &one_year),
        category_average_1y: mean(&one_year).map(round2),
        category_average_3y: mean(&three_year).map(round2),
        top_performers: with_returns
            .iter()
            .take(TOP_PEERS)
            .map(|(fund, r)| PeerPerformance {
                isin: fund.isin.clone(),
                scheme_name: fund.scheme_name.clone(),
                return_1y: r.return_1y,
                return_3y: r.return_3y,
            })
            .collect(),
    }
}

fn portfolio_composition(holdings: &[Holding], flows: Option<&FlowStatistics>) -> PortfolioComposition {
    let mut sorted: Vec<&Holding> = holdings.iter().collect();
    sorted.sort_by(|a, b| b.percentage_to_nav.total_cmp(&a.percentage_to_nav));
    let top: Vec<TopHolding> = sorted
        .into_iter()
        .take(TOP_HOLDINGS)
        .map(|h| TopHolding {
            name: h.instrument_name.clone(),
            percentage: h.percentage_to_nav,
            sector: h.sector.clone(),
            instrument_type: h.instrument_type.clone(),
        })
        .collect();
    PortfolioComposition {
        total_holdings: holdings.len(),
        top_10_concentration: round2(top.iter().map(|h| h.percentage).sum()),
        top_holdings: top,
        diversification_score: holdings_diversification(holdings.len()),
        asset_allocation: flows.map(|f| AssetAllocation {
            equity: f.equity_percentage,
            debt: f.debt_percentage,
            cash: f.cash_percentage,
            other: f.other_percentage,
        }),
    }
}

fn sector_summary(holdings: &[Holding]) -> SectorAllocationSummary {
    let sectors = sector_allocation(holdings);
    let mut top: Vec<SectorWeight> = sectors
        .iter()
        .map(|(sector, weight)| SectorWeight {
            sector: sector.clone(),
            weight: round2(*weight),
        })
        .collect();
    top.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    top.truncate(TOP_SECTORS);
    SectorAllocationSummary {
        sector_count: sectors.len(),
        sector_diversification_score: sector_diversification(&sectors),
        top_sectors: top,
        sectors,
    }
}

fn rating_summary(ratings: &[FundRating]) -> RatingSummary {
    let mut by_agency: BTreeMap<String, Vec<RatingEntry>> = BTreeMap::new();
    for rating in ratings {
        by_agency
            .entry(rating.rating_agency.clone())
            .or_default()
            .push(RatingEntry {
                value: rating.rating_value.clone(),
                numeric: rating.rating_numeric,
                outlook: rating.rating_outlook.clone(),
                date: rating.rating_date,
            });
    }
    let values: Vec<f64> = ratings.iter().filter_map(|r| r.rating_numeric).collect();
    RatingSummary {
        total_ratings: ratings.len(),
        average_rating: mean(&values).map(round2),
        ratings_by_agency: by_agency,
    }
}

pub fn build_analytics(input: &AnalyticsInput, as_of: NaiveDate, generated_at: DateTime<Utc>) -> FundAnalytics {
    let fund = &input.fund;
    let sheet = input.factsheet.as_ref();
    let returns = input.returns.as_ref();
    let risk = input.risk.as_ref();

    let nav_based = if risk.is_none() { nav_risk(&input.nav) } else { None };
    let grade_source = risk
        .and_then(|r| r.standard_deviation)
        .or(nav_based.as_ref().map(|n| n.standard_deviation));
    let score = recommendation_score(returns, risk);

    FundAnalytics {
        isin: fund.isin.clone(),
        generated_at,
        basic_info: BasicInfo {
            isin: fund.isin.clone(),
            scheme_name: fund.scheme_name.clone(),
            fund_type: fund.fund_type.clone(),
            fund_subtype: fund.fund_subtype.clone(),
            amc_name: fund.amc_name.clone(),
            fund_manager: sheet.and_then(|s| s.fund_manager.clone()),
            aum: sheet.and_then(|s| s.aum),
            expense_ratio: sheet.and_then(|s| s.expense_ratio),
            launch_date: sheet.and_then(|s| s.launch_date),
            exit_load: sheet.and_then(|s| s.exit_load.clone()),
        },
        performance_metrics: PerformanceMetrics {
            returns: input.returns.clone(),
            volatility: returns.map_or("Insufficient data", volatility_label),
            consistency_score: returns.map_or(0.0, |r| round2(consistency_score(r))),
        },
        risk_analysis: RiskAnalysis {
            metrics: input.risk.clone(),
            note: (risk.is_none() && nav_based.is_none())
                .then_some("Insufficient NAV data for risk calculation"),
            nav_based,
            risk_grade: risk_grade(grade_source),
        },
        portfolio_composition: portfolio_composition(&input.holdings, input.flows.as_ref()),
        sector_allocation: sector_summary(&input.holdings),
        peer_comparison: peer_comparison(fund, returns, &input.peers),
        flow_analysis: FlowAnalysis {
            flow_trend: flow_trend(input.flows.as_ref().and_then(|f| f.yearly_flow)),
            investor_sentiment: investor_sentiment(input.flows.as_ref().and_then(|f| f.net_flow)),
            statistics: input.flows.clone(),
        },
        rating_summary: rating_summary(&input.ratings),
        nav_trends: nav_trends(&input.nav, as_of),
        recommendation: Recommendation {
            score: round2(score),
            grade: recommendation_grade(score),
            strengths: strengths(returns, risk),
            concerns: concerns(returns, risk),
        },
    }
}
