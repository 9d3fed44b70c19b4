use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lookup key for a name: lowercase, punctuation to spaces, collapsed whitespace.
///
/// `"Man. Utd"` and `"man utd "` share the key `"man utd"`.
pub fn fold_key(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trims and collapses inner whitespace, keeping case and punctuation.
pub fn clean_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasKind {
    Team,
    Player,
}

/// A name the normalizer had to mint a canonical identity for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredAlias {
    pub kind: AliasKind,
    pub raw: String,
    pub canonical: String,
}

/// Versioned map from folded raw names to canonical names.
///
/// Tables are never mutated in place; every change yields a new table with a
/// higher version so batches can record which table they were resolved with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    version: u64,
    teams: BTreeMap<String, String>,
    players: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize)]
struct AliasFile {
    version: u64,
    #[serde(default)]
    fingerprint: Option<String>,
    #[serde(default)]
    teams: BTreeMap<String, String>,
    #[serde(default)]
    players: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.teams.len() + self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn map(&self, kind: AliasKind) -> &BTreeMap<String, String> {
        match kind {
            AliasKind::Team => &self.teams,
            AliasKind::Player => &self.players,
        }
    }

    fn map_mut(&mut self, kind: AliasKind) -> &mut BTreeMap<String, String> {
        match kind {
            AliasKind::Team => &mut self.teams,
            AliasKind::Player => &mut self.players,
        }
    }

    pub fn resolve(&self, kind: AliasKind, raw: &str) -> Option<&str> {
        let key = fold_key(raw);
        if key.is_empty() {
            return None;
        }
        self.map(kind).get(&key).map(String::as_str)
    }

    /// Canonical names known for `kind`, deduplicated and sorted.
    pub fn canonical_names(&self, kind: AliasKind) -> Vec<&str> {
        let mut names: Vec<&str> = self.map(kind).values().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    fn put(&mut self, kind: AliasKind, raw: &str, canonical: &str) {
        let canonical = clean_name(canonical);
        let map = self.map_mut(kind);
        map.insert(fold_key(&canonical), canonical.clone());
        let key = fold_key(raw);
        if !key.is_empty() {
            map.insert(key, canonical);
        }
    }

    pub fn with_alias(&self, kind: AliasKind, raw: &str, canonical: &str) -> Self {
        self.with_aliases([(kind, raw, canonical)])
    }

    pub fn with_aliases<'a>(
        &self,
        entries: impl IntoIterator<Item = (AliasKind, &'a str, &'a str)>,
    ) -> Self {
        let mut next = self.clone();
        for (kind, raw, canonical) in entries {
            next.put(kind, raw, canonical);
        }
        next.version = self.version + 1;
        next
    }

    /// Adds discovered names without overriding existing entries.
    ///
    /// The version only moves when at least one entry was new.
    pub fn extended(&self, discovered: &[DiscoveredAlias]) -> Self {
        let mut next = self.clone();
        let mut changed = false;
        for d in discovered {
            let key = fold_key(&d.raw);
            if key.is_empty() || next.map(d.kind).contains_key(&key) {
                continue;
            }
            next.put(d.kind, &d.raw, &d.canonical);
            changed = true;
        }
        if changed {
            next.version = self.version + 1;
        }
        next
    }

    /// SHA-256 over the sorted entries; equal tables give equal fingerprints
    /// regardless of version.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (tag, map) in [("team", &self.teams), ("player", &self.players)] {
            for (k, v) in map {
                hasher.update(tag.as_bytes());
                hasher.update([0u8]);
                hasher.update(k.as_bytes());
                hasher.update([0u8]);
                hasher.update(v.as_bytes());
                hasher.update([b'\n']);
            }
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Missing file yields an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read alias table {}", path.display()))?;
        let file: AliasFile = serde_json::from_str(&raw)
            .with_context(|| format!("parse alias table {}", path.display()))?;

        let mut table = Self {
            version: file.version,
            ..Self::default()
        };
        for (raw, canonical) in &file.teams {
            table.put(AliasKind::Team, raw, canonical);
        }
        for (raw, canonical) in &file.players {
            table.put(AliasKind::Player, raw, canonical);
        }
        if let Some(saved) = file.fingerprint.as_deref() {
            if saved != table.fingerprint() {
                tracing::warn!(path = %path.display(), "alias table fingerprint mismatch; file was edited by hand");
            }
        }
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let file = AliasFile {
            version: self.version,
            fingerprint: Some(self.fingerprint()),
            teams: self.teams.clone(),
            players: self.players.clone(),
        };
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&file).context("serialize alias table")?;
        fs::write(&tmp, json).context("write alias table")?;
        fs::rename(&tmp, path).context("swap alias table")?;
        Ok(())
    }
}
