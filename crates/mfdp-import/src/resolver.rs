use std::collections::{BTreeMap, BTreeSet};

use strsim::jaro_winkler;

const MIN_WORD_LEN: usize = 4;

/// Lowercase alphanumeric words long enough to carry meaning.
pub fn name_words(name: &str) -> BTreeSet<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
        .map(str::to_string)
        .collect()
}

fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Known funds plus a word -> ISIN reverse index over their scheme names.
#[derive(Debug, Clone, Default)]
pub struct FundIndex {
    names: BTreeMap<String, String>,
    words: BTreeMap<String, BTreeSet<String>>,
}

impl FundIndex {
    pub fn new(names: BTreeMap<String, String>) -> Self {
        let mut words: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (isin, name) in &names {
            for word in name_words(name) {
                words.entry(word).or_default().insert(isin.clone());
            }
        }
        Self { names, words }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, isin: &str) -> bool {
        self.names.contains_key(isin)
    }

    /// Candidate with the most shared words.
    ///
    /// Ties go to the closest Jaro-Winkler name, then to the lowest ISIN.
    pub fn best_name_match(&self, scheme_name: &str) -> Option<String> {
        let mut hits: BTreeMap<&str, usize> = BTreeMap::new();
        for word in name_words(scheme_name) {
            if let Some(isins) = self.words.get(&word) {
                for isin in isins {
                    *hits.entry(isin.as_str()).or_default() += 1;
                }
            }
        }
        let top = *hits.values().max()?;
        let wanted = normalize_name(scheme_name);
        let mut best: Option<(&str, f64)> = None;
        // BTreeMap order means the first of equal scores is the lowest ISIN.
        for (isin, _) in hits.iter().filter(|(_, count)| **count == top) {
            let candidate = self.names.get(*isin).map(|n| normalize_name(n)).unwrap_or_default();
            let score = jaro_winkler(&wanted, &candidate);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((isin, score));
            }
        }
        best.map(|(isin, _)| isin.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundMatch {
    Exact(String),
    Fuzzy(String),
    NotFound,
    /// Neither a usable ISIN nor a scheme name was present.
    NoReference,
}

/// Maps a row's fund reference onto a stored fund.
pub trait FundResolver: Send + Sync {
    fn resolve(&self, index: &FundIndex, isin: Option<&str>, scheme_name: Option<&str>) -> FundMatch;
}

/// ISIN lookup only.
#[derive(Default)]
pub struct ExactResolver;

impl FundResolver for ExactResolver {
    fn resolve(&self, index: &FundIndex, isin: Option<&str>, _scheme_name: Option<&str>) -> FundMatch {
        match isin {
            Some(isin) if index.contains(isin) => FundMatch::Exact(isin.to_string()),
            Some(_) => FundMatch::NotFound,
            None => FundMatch::NoReference,
        }
    }
}

/// ISIN lookup with a fallback to scheme-name word matching.
#[derive(Default)]
pub struct NameIndexResolver;

impl FundResolver for NameIndexResolver {
    fn resolve(&self, index: &FundIndex, isin: Option<&str>, scheme_name: Option<&str>) -> FundMatch {
        if let Some(isin) = isin {
            if index.contains(isin) {
                return FundMatch::Exact(isin.to_string());
            }
        }
        match scheme_name {
            Some(name) => index
                .best_name_match(name)
                .map_or(FundMatch::NotFound, FundMatch::Fuzzy),
            None if isin.is_some() => FundMatch::NotFound,
            None => FundMatch::NoReference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(entries: &[(&str, &str)]) -> FundIndex {
        FundIndex::new(
            entries
                .iter()
                .map(|(isin, name)| (isin.to_string(), name.to_string()))
                .collect(),
        )
    }

    #[test]
    fn words_drop_short_tokens() {
        let words = name_words("HDFC Top 100 Fund - Direct Plan");
        assert_eq!(
            words.into_iter().collect::<Vec<_>>(),
            vec!["direct", "fund", "hdfc", "plan"]
        );
    }

    #[test]
    fn most_shared_words_wins() {
        let idx = index(&[
            ("INF000000001", "Axis Bluechip Fund Growth"),
            ("INF000000002", "Axis Midcap Fund Growth"),
        ]);
        assert_eq!(
            idx.best_name_match("axis bluechip fund").as_deref(),
            Some("INF000000001")
        );
        assert_eq!(idx.best_name_match("unrelated words here"), None);
    }

    #[test]
    fn ties_break_on_similarity_then_isin() {
        let idx = index(&[
            ("INF000000009", "Alpha Growth Fund"),
            ("INF000000003", "Alpha Growth Fund"),
            ("INF000000005", "Growth Alpha Fund Extra"),
        ]);
        // All three share "alpha", "growth" and "fund"; the two exact names tie on
        // similarity, so the lower ISIN wins.
        assert_eq!(
            idx.best_name_match("Alpha Growth Fund").as_deref(),
            Some("INF000000003")
        );
    }

    #[test]
    fn resolvers_classify_references() {
        let idx = index(&[("INF000000001", "Axis Bluechip Fund")]);
        let fuzzy = NameIndexResolver;
        assert_eq!(
            fuzzy.resolve(&idx, Some("INF000000001"), None),
            FundMatch::Exact("INF000000001".into())
        );
        assert_eq!(
            fuzzy.resolve(&idx, Some("INF999999999"), Some("Axis Bluechip")),
            FundMatch::Fuzzy("INF000000001".into())
        );
        assert_eq!(fuzzy.resolve(&idx, Some("INF999999999"), None), FundMatch::NotFound);
        assert_eq!(fuzzy.resolve(&idx, None, None), FundMatch::NoReference);

        let exact = ExactResolver;
        assert_eq!(exact.resolve(&idx, None, Some("Axis Bluechip")), FundMatch::NoReference);
        assert_eq!(exact.resolve(&idx, Some("INF999999999"), Some("Axis")), FundMatch::NotFound);
    }
}
