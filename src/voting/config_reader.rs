use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use vote_budget::{BudgetRules, Candidate, CandidateId};

use crate::voting::*;

pub const DEFAULT_STORE_FILE: &str = "votebudget-store.json";
pub const DEFAULT_CACHE_FILE: &str = "votebudget-session.json";

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundSettings {
    pub name: Option<String>,
    #[serde(rename = "totalVotes")]
    pub total_votes: Option<u64>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "profilePic")]
    pub profile_pic: Option<String>,
    pub url: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(rename = "remotePath")]
    pub remote_path: Option<String>,
    #[serde(rename = "cachePath")]
    pub cache_path: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteConfig {
    #[serde(default)]
    pub round: RoundSettings,
    pub candidates: Option<Vec<CandidateConfig>>,
    #[serde(default)]
    pub storage: StorageSettings,
}

pub fn read_config(path: &Path) -> VoteResult<VoteConfig> {
    let display = path.display().to_string();
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu {
        path: display.clone(),
    })?;
    let config: VoteConfig =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path: display })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

/// The candidates of a round started without a configuration file.
pub fn default_candidates() -> Vec<Candidate> {
    (1..=5)
        .map(|idx| Candidate {
            id: CandidateId(format!("c{}", idx)),
            name: format!("Candidate {}", idx),
            profile_pic: Some(format!("https://i.pravatar.cc/150?img={}", idx)),
            url: Some(format!("https://example.com/candidate{}", idx)),
        })
        .collect()
}

fn non_empty(s: &Option<String>) -> Option<String> {
    match s.clone() {
        Some(x) if x.trim().is_empty() => None,
        x => x,
    }
}

pub fn validate_config(config: &VoteConfig) -> VoteResult<(BudgetRules, Vec<Candidate>)> {
    let rules = match config.round.total_votes {
        None => BudgetRules::DEFAULT_RULES,
        Some(0) => whatever!("totalVotes must be at least 1"),
        Some(total_votes) => BudgetRules { total_votes },
    };
    let candidates: Vec<Candidate> = match &config.candidates {
        None => default_candidates(),
        Some(cs) => {
            let mut res: Vec<Candidate> = Vec::new();
            for c in cs.iter() {
                if c.id.trim().is_empty() {
                    whatever!("Candidate {:?} has an empty id", c.name)
                }
                res.push(Candidate {
                    id: CandidateId(c.id.trim().to_string()),
                    name: c.name.clone(),
                    profile_pic: non_empty(&c.profile_pic),
                    url: non_empty(&c.url),
                });
            }
            res
        }
    };
    info!(
        "Round {:?}: {} votes, {} candidates",
        config.round.name.clone().unwrap_or_default(),
        rules.total_votes,
        candidates.len()
    );
    Ok((rules, candidates))
}

/// Where the shared store and the session cache live.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct StoragePaths {
    pub store: PathBuf,
    pub cache: PathBuf,
}

/// Command line flags win over the configuration file. Paths from the
/// configuration file are relative to the directory of that file.
pub fn resolve_storage(
    config: &VoteConfig,
    config_dir: Option<&Path>,
    store_flag: Option<&str>,
    cache_flag: Option<&str>,
) -> StoragePaths {
    let from_config = |p: &Option<String>| -> Option<PathBuf> {
        p.as_ref().map(|s| match config_dir {
            Some(dir) => dir.join(s),
            None => PathBuf::from(s),
        })
    };
    let store = store_flag
        .map(PathBuf::from)
        .or_else(|| from_config(&config.storage.remote_path))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_FILE));
    let cache = cache_flag
        .map(PathBuf::from)
        .or_else(|| from_config(&config.storage.cache_path))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE));
    debug!("resolve_storage: store {:?}, cache {:?}", store, cache);
    StoragePaths { store, cache }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: VoteConfig = serde_json::from_str("{}").unwrap();
        let (rules, candidates) = validate_config(&config).unwrap();
        assert_eq!(rules, BudgetRules::DEFAULT_RULES);
        assert_eq!(candidates.len(), 5);
        assert_eq!(candidates[0].id, CandidateId::from("c1"));
        assert_eq!(candidates[4].name, "Candidate 5");
        assert_eq!(
            candidates[2].profile_pic.as_deref(),
            Some("https://i.pravatar.cc/150?img=3")
        );
    }

    #[test]
    fn full_config() {
        let js = r#"{
            "round": {"name": "Spring", "totalVotes": 20},
            "candidates": [
                {"id": "a", "name": "Ada", "profilePic": "", "url": "https://example.com/a"},
                {"id": "b", "name": "Bea"}
            ],
            "storage": {"remotePath": "data/store.json"}
        }"#;
        let config: VoteConfig = serde_json::from_str(js).unwrap();
        let (rules, candidates) = validate_config(&config).unwrap();
        assert_eq!(rules.total_votes, 20);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].profile_pic, None);
        assert_eq!(candidates[0].url.as_deref(), Some("https://example.com/a"));

        let paths = resolve_storage(&config, Some(Path::new("/srv/round")), None, None);
        assert_eq!(paths.store, PathBuf::from("/srv/round/data/store.json"));
        assert_eq!(paths.cache, PathBuf::from(DEFAULT_CACHE_FILE));

        let paths = resolve_storage(&config, Some(Path::new("/srv/round")), Some("s.json"), Some("c.json"));
        assert_eq!(paths.store, PathBuf::from("s.json"));
        assert_eq!(paths.cache, PathBuf::from("c.json"));
    }

    #[test]
    fn bad_configs() {
        let config: VoteConfig = serde_json::from_str(r#"{"round": {"totalVotes": 0}}"#).unwrap();
        assert!(validate_config(&config).is_err());
        let config: VoteConfig =
            serde_json::from_str(r#"{"candidates": [{"id": " ", "name": "Nobody"}]}"#).unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn read_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert!(matches!(
            read_config(&path),
            Err(VoteError::OpeningJson { .. })
        ));
        fs::write(&path, "{ round").unwrap();
        assert!(matches!(
            read_config(&path),
            Err(VoteError::ParsingJson { .. })
        ));
    }
}
