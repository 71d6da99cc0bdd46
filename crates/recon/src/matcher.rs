use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::config::{AmountSignMode, MatchConfig, Resolution};
use crate::model::{MatchCandidate, MatchResult, MatchTier, MatchedPair, Record};
use crate::similarity::FuzzyKey;

/// Pair ERP records with bank records, one tier at a time.
///
/// Each tier only sees records left unclaimed by the tiers before it, so a
/// lower-confidence pairing can never take a record that an exact match
/// needed. Deterministic for identical inputs and configuration.
pub fn match_records(erp: &[Record], bank: &[Record], config: &MatchConfig) -> MatchResult {
    let mut pool = Pool::new(erp, bank, config);
    let mut chosen: Vec<MatchCandidate> = Vec::new();

    for tier in MatchTier::ALL {
        let candidates = pool.candidates(tier, config);
        let offered = candidates.len();
        let pairs = match config.resolution {
            Resolution::Greedy => resolve_greedy(candidates, erp, bank),
            Resolution::Maximum => resolve_maximum(candidates, erp, bank),
        };
        debug!("{tier} tier: {offered} candidates, {} pairs", pairs.len());

        for c in &pairs {
            pool.erp_claimed[c.erp] = true;
            pool.bank_claimed[c.bank] = true;
        }
        chosen.extend(pairs);
    }

    let mut matched: Vec<MatchedPair> = chosen
        .into_iter()
        .map(|c| {
            let e = &erp[c.erp];
            let b = &bank[c.bank];
            MatchedPair {
                erp: e.clone(),
                bank: b.clone(),
                tier: c.tier,
                score: c.score,
                date_offset_days: (b.date - e.date).num_days(),
                similarity: c.similarity,
            }
        })
        .collect();
    matched.sort_by_key(|p| p.erp.row_index);

    MatchResult {
        matched,
        unmatched_erp: unclaimed(erp, &pool.erp_claimed),
        unmatched_bank: unclaimed(bank, &pool.bank_claimed),
    }
}

fn unclaimed(records: &[Record], claimed: &[bool]) -> Vec<Record> {
    let mut out: Vec<Record> = records
        .iter()
        .zip(claimed)
        .filter(|(_, taken)| !**taken)
        .map(|(r, _)| r.clone())
        .collect();
    out.sort_by_key(|r| r.row_index);
    out
}

// ---------------------------------------------------------------------------
// Candidate generation
// ---------------------------------------------------------------------------

/// Index-based record store with a claimed flag per record.
struct Pool<'a> {
    erp: &'a [Record],
    bank: &'a [Record],
    erp_fuzzy: Vec<FuzzyKey>,
    bank_fuzzy: Vec<FuzzyKey>,
    erp_claimed: Vec<bool>,
    bank_claimed: Vec<bool>,
}

impl<'a> Pool<'a> {
    fn new(erp: &'a [Record], bank: &'a [Record], config: &MatchConfig) -> Self {
        let fuzzy = |records: &[Record]| -> Vec<FuzzyKey> {
            records
                .iter()
                .map(|r| FuzzyKey::new(&r.reference, &config.noise_words))
                .collect()
        };
        Self {
            erp,
            bank,
            erp_fuzzy: fuzzy(erp),
            bank_fuzzy: fuzzy(bank),
            erp_claimed: vec![false; erp.len()],
            bank_claimed: vec![false; bank.len()],
        }
    }

    /// Unclaimed ERP x unclaimed bank, filtered by the tier predicate.
    /// Every tier requires equal amounts, so bank records are bucketed by
    /// amount key first.
    fn candidates(&self, tier: MatchTier, config: &MatchConfig) -> Vec<MatchCandidate> {
        let mode = config.amount_sign_mode;
        let mut bank_by_amount: HashMap<i128, Vec<usize>> = HashMap::new();
        for (bi, b) in self.bank.iter().enumerate() {
            if !self.bank_claimed[bi] {
                bank_by_amount.entry(amount_key(b, mode)).or_default().push(bi);
            }
        }

        let mut out = Vec::new();
        for (ei, e) in self.erp.iter().enumerate() {
            if self.erp_claimed[ei] {
                continue;
            }
            let Some(bucket) = bank_by_amount.get(&amount_key(e, mode)) else {
                continue;
            };
            for &bi in bucket {
                if let Some(similarity) = self.qualifies(tier, ei, bi, config) {
                    out.push(MatchCandidate {
                        erp: ei,
                        bank: bi,
                        tier,
                        score: tier.score(),
                        similarity,
                    });
                }
            }
        }
        out
    }

    /// Tier predicate, amount equality already established.
    /// Returns the reference similarity when the pair qualifies.
    fn qualifies(&self, tier: MatchTier, ei: usize, bi: usize, config: &MatchConfig) -> Option<f64> {
        let e = &self.erp[ei];
        let b = &self.bank[bi];
        let same_key = !e.match_key.is_empty() && e.match_key == b.match_key;
        let within_window =
            (b.date - e.date).num_days().abs() <= i64::from(config.date_window_days);

        match tier {
            MatchTier::Exact => (e.date == b.date && same_key).then_some(1.0),
            MatchTier::Near => (within_window && same_key).then_some(1.0),
            MatchTier::Fuzzy => {
                if !within_window {
                    return None;
                }
                let score = self.erp_fuzzy[ei].similarity(&self.bank_fuzzy[bi], config.fuzzy_metric);
                (score >= config.fuzzy_threshold).then_some(score)
            }
        }
    }
}

fn amount_key(record: &Record, mode: AmountSignMode) -> i128 {
    let amount = i128::from(record.amount_minor);
    match mode {
        AmountSignMode::Absolute => amount.abs(),
        AmountSignMode::Signed => amount,
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

fn sort_by_rows(candidates: &mut [MatchCandidate], erp: &[Record], bank: &[Record]) {
    candidates.sort_by_key(|c| (erp[c.erp].row_index, bank[c.bank].row_index));
}

/// Walk candidates by (ERP row, bank row) and commit a pair only while both
/// sides are still free. This is the tie-break for ambiguous inputs.
fn resolve_greedy(
    mut candidates: Vec<MatchCandidate>,
    erp: &[Record],
    bank: &[Record],
) -> Vec<MatchCandidate> {
    sort_by_rows(&mut candidates, erp, bank);
    let mut erp_taken = vec![false; erp.len()];
    let mut bank_taken = vec![false; bank.len()];
    let mut out = Vec::new();
    for c in candidates {
        if erp_taken[c.erp] || bank_taken[c.bank] {
            continue;
        }
        erp_taken[c.erp] = true;
        bank_taken[c.bank] = true;
        out.push(c);
    }
    out
}

/// Maximum-cardinality matching by augmenting paths. ERP records are tried in
/// row order and neighbours in bank row order, so the result is deterministic
/// and equals the greedy result when no record has more than one candidate.
fn resolve_maximum(
    mut candidates: Vec<MatchCandidate>,
    erp: &[Record],
    bank: &[Record],
) -> Vec<MatchCandidate> {
    sort_by_rows(&mut candidates, erp, bank);

    // Consecutive runs share an ERP record after sorting.
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut last_erp = None;
    for (ci, c) in candidates.iter().enumerate() {
        if last_erp != Some(c.erp) {
            groups.push(Vec::new());
            last_erp = Some(c.erp);
        }
        if let Some(group) = groups.last_mut() {
            group.push(ci);
        }
    }

    let mut left_mate: Vec<Option<usize>> = vec![None; groups.len()];
    let mut bank_owner: Vec<Option<usize>> = vec![None; bank.len()];
    let mut reached_from: Vec<(usize, usize)> = vec![(0, 0); bank.len()];
    let mut visited: Vec<usize> = vec![0; bank.len()];

    for start in 0..groups.len() {
        let stamp = start + 1;
        let mut queue = VecDeque::from([start]);
        'search: while let Some(g) = queue.pop_front() {
            for &ci in &groups[g] {
                let b = candidates[ci].bank;
                if visited[b] == stamp {
                    continue;
                }
                visited[b] = stamp;
                reached_from[b] = (g, ci);
                match bank_owner[b] {
                    Some(owner) => queue.push_back(owner),
                    None => {
                        // Flip the alternating path back to `start`.
                        let mut free_bank = b;
                        loop {
                            let (g, ci) = reached_from[free_bank];
                            let previous = left_mate[g].replace(ci);
                            bank_owner[free_bank] = Some(g);
                            match previous {
                                Some(prev_ci) => free_bank = candidates[prev_ci].bank,
                                None => break,
                            }
                        }
                        break 'search;
                    }
                }
            }
        }
    }

    left_mate
        .into_iter()
        .flatten()
        .map(|ci| candidates[ci].clone())
        .collect()
}
