use log::{debug, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("No ranking source for isodose {0}")]
    RankingMissing(u32),

    #[error("Malformed ranking line {line:?} in {path}")]
    MalformedLine { path: PathBuf, line: String },

    #[error("Duplicate agreement score for member {0}")]
    DuplicateMember(usize),

    #[error("No agreement score for member {0}")]
    MissingMember(usize),

    #[error("Ranking file {0} contains no records")]
    EmptyRanking(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-member agreement scores for one isodose threshold.
///
/// Scores come pre-quantized from the ranking files, so outlier detection is
/// exact equality to zero, not an epsilon comparison.
#[derive(Clone, Debug)]
pub struct RankingRecord {
    scores: Vec<f32>,
}

impl RankingRecord {
    pub fn new(scores: Vec<f32>) -> Self {
        Self { scores }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, member: usize) -> Option<f32> {
        self.scores.get(member).copied()
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    /// The member with the highest agreement score; ties break to the
    /// lowest member index.
    pub fn median(&self) -> usize {
        let mut best = 0;
        for (member, &score) in self.scores.iter().enumerate() {
            if score > self.scores[best] {
                best = member;
            }
        }
        best
    }

    /// Members whose agreement score is exactly zero.
    pub fn outliers(&self) -> Vec<usize> {
        self.scores
            .iter()
            .enumerate()
            .filter(|&(_, &score)| score == 0.0)
            .map(|(member, _)| member)
            .collect()
    }
}

/// The files backing one isodose threshold: the ranking record plus the
/// optional precomputed agreement-band masks.
#[derive(Clone, Debug)]
pub struct IsovalueEntry {
    pub ranking: PathBuf,
    pub band50: Option<PathBuf>,
    pub band100: Option<PathBuf>,
}

/// Threshold-keyed index over a ranking root directory.
///
/// The root holds one child directory per isodose value; the key is the
/// first integer run in the directory name (`80`, `i80` and `isovalue80`
/// all key isodose 80). Children without an integer or without a ranking
/// `.txt` file are skipped.
#[derive(Debug, Default)]
pub struct RankingStore {
    entries: BTreeMap<u32, IsovalueEntry>,
}

impl RankingStore {
    pub fn scan(root: &Path) -> Result<Self, RankingError> {
        let mut entries = BTreeMap::new();
        for child in fs::read_dir(root)? {
            let child = child?;
            let path = child.path();
            if !path.is_dir() {
                continue;
            }
            let name = child.file_name();
            let Some(isodose) = parse_isodose(&name.to_string_lossy()) else {
                continue;
            };
            match index_isovalue_dir(&path)? {
                Some(entry) => {
                    debug!(
                        "ranking scan: isodose {} -> {} (band50: {}, band100: {})",
                        isodose,
                        entry.ranking.display(),
                        entry.band50.is_some(),
                        entry.band100.is_some(),
                    );
                    entries.insert(isodose, entry);
                }
                None => warn!(
                    "ranking scan: {} has no ranking file, skipping",
                    path.display()
                ),
            }
        }
        Ok(Self { entries })
    }

    pub fn thresholds(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    pub fn entry(&self, threshold: u32) -> Option<&IsovalueEntry> {
        self.entries.get(&threshold)
    }

    /// Read and validate the ranking record for one threshold.
    ///
    /// # Errors
    ///
    /// `RankingMissing` when the scan found no source for the threshold;
    /// parse errors when the file violates the one-score-per-member format.
    pub fn load_ranking(&self, threshold: u32) -> Result<RankingRecord, RankingError> {
        let entry = self
            .entries
            .get(&threshold)
            .ok_or(RankingError::RankingMissing(threshold))?;
        parse_ranking_file(&entry.ranking)
    }
}

fn parse_isodose(name: &str) -> Option<u32> {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn index_isovalue_dir(dir: &Path) -> Result<Option<IsovalueEntry>, RankingError> {
    let mut ranking = None;
    let mut band50 = None;
    let mut band100 = None;
    for file in fs::read_dir(dir)? {
        let path = file?.path();
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if stem.ends_with("100") {
            band100 = Some(path);
        } else if stem.ends_with("50") {
            band50 = Some(path);
        } else if path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
        {
            ranking = Some(path);
        }
    }
    Ok(ranking.map(|ranking| IsovalueEntry {
        ranking,
        band50,
        band100,
    }))
}

/// Parse `<score:float> <member_id:int>` lines into a dense per-member
/// record. Every member in 0..N must appear exactly once.
fn parse_ranking_file(path: &Path) -> Result<RankingRecord, RankingError> {
    let contents = fs::read_to_string(path)?;
    let mut scores: Vec<Option<f32>> = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let parsed = match (parts.next(), parts.next(), parts.next()) {
            (Some(score), Some(member), None) => score
                .parse::<f32>()
                .ok()
                .zip(member.parse::<usize>().ok()),
            _ => None,
        };
        let Some((score, member)) = parsed else {
            return Err(RankingError::MalformedLine {
                path: path.to_path_buf(),
                line: line.to_owned(),
            });
        };
        if member >= scores.len() {
            scores.resize(member + 1, None);
        }
        if scores[member].replace(score).is_some() {
            return Err(RankingError::DuplicateMember(member));
        }
    }

    if scores.is_empty() {
        return Err(RankingError::EmptyRanking(path.to_path_buf()));
    }
    let scores = scores
        .into_iter()
        .enumerate()
        .map(|(member, score)| score.ok_or(RankingError::MissingMember(member)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RankingRecord::new(scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn median_ties_break_to_the_lowest_index() {
        let record = RankingRecord::new(vec![0.2, 0.9, 0.9, 0.0]);
        assert_eq!(record.median(), 1);
        assert_eq!(record.outliers(), vec![3]);
    }

    #[test]
    fn outliers_require_exact_zero() {
        let record = RankingRecord::new(vec![1e-7, 0.0, 0.5]);
        assert_eq!(record.outliers(), vec![1]);
    }

    #[test]
    fn scan_keys_directories_by_integer() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("isovalue80");
        fs::create_dir(&dir).unwrap();
        let mut ranking = File::create(dir.join("ranking.txt")).unwrap();
        write!(ranking, "1.0 0\n0.0 1\n0.0 2\n").unwrap();
        File::create(dir.join("band50.dat")).unwrap();
        File::create(dir.join("band100.dat")).unwrap();
        fs::create_dir(root.path().join("notes")).unwrap();

        let store = RankingStore::scan(root.path()).unwrap();
        assert_eq!(store.thresholds().collect::<Vec<_>>(), vec![80]);
        let entry = store.entry(80).unwrap();
        assert!(entry.band50.is_some());
        assert!(entry.band100.is_some());

        let record = store.load_ranking(80).unwrap();
        assert_eq!(record.median(), 0);
        assert_eq!(record.outliers(), vec![1, 2]);
    }

    #[test]
    fn missing_threshold_is_ranking_missing() {
        let root = tempfile::tempdir().unwrap();
        let store = RankingStore::scan(root.path()).unwrap();
        assert!(matches!(
            store.load_ranking(80),
            Err(RankingError::RankingMissing(80))
        ));
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("60");
        fs::create_dir(&dir).unwrap();
        let mut ranking = File::create(dir.join("ranking.txt")).unwrap();
        write!(ranking, "0.5 zero\n").unwrap();

        let store = RankingStore::scan(root.path()).unwrap();
        assert!(matches!(
            store.load_ranking(60),
            Err(RankingError::MalformedLine { .. })
        ));
    }

    #[test]
    fn gaps_in_member_ids_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("60");
        fs::create_dir(&dir).unwrap();
        let mut ranking = File::create(dir.join("ranking.txt")).unwrap();
        write!(ranking, "0.5 0\n0.5 2\n").unwrap();

        let store = RankingStore::scan(root.path()).unwrap();
        assert!(matches!(
            store.load_ranking(60),
            Err(RankingError::MissingMember(1))
        ));
    }
}
