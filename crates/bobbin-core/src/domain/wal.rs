//! WAL locations - レプリケーション位置のスナップショット
//!
//! Postgres の LSN は `"HI/LO"`（16進数の上位 32bit / 下位 32bit）で表されます。
//! 重複として落とされたジョブの WAL 位置を、実行中の元ジョブに引き継ぐことで
//! 「落とされた側が期待していた書き込み」がレプリカに見えるまで待てるようにします。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A replication-log position marker for one data shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalLocation(String);

impl WalLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Byte offset of the LSN (`HI << 32 | LO`), `None` when not an LSN.
    pub fn offset(&self) -> Option<u64> {
        let (hi, lo) = self.0.split_once('/')?;
        let hi = u32::from_str_radix(hi, 16).ok()?;
        let lo = u32::from_str_radix(lo, 16).ok()?;
        Some((u64::from(hi) << 32) | u64::from(lo))
    }

    /// `other` で置き換えるべきか
    ///
    /// 解析できない位置は、解析できる位置を上書きしません。
    pub fn is_behind(&self, other: &WalLocation) -> bool {
        match (self.offset(), other.offset()) {
            (Some(mine), Some(theirs)) => theirs > mine,
            (None, Some(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WalLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for WalLocation {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Shard name -> WAL location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalLocations(BTreeMap<String, WalLocation>);

impl WalLocations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, shard: impl Into<String>, location: impl Into<WalLocation>) {
        self.0.insert(shard.into(), location.into());
    }

    pub fn get(&self, shard: &str) -> Option<&WalLocation> {
        self.0.get(shard)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &WalLocation)> {
        self.0.iter()
    }

    /// Keep, per shard, whichever location is further ahead.
    ///
    /// Returns true when anything changed.
    pub fn merge_latest(&mut self, incoming: &WalLocations) -> bool {
        let mut changed = false;
        for (shard, location) in incoming.iter() {
            let replace = match self.0.get(shard) {
                Some(current) => current.is_behind(location),
                None => true,
            };
            if replace {
                self.0.insert(shard.clone(), location.clone());
                changed = true;
            }
        }
        changed
    }
}

impl<S: Into<String>, L: Into<WalLocation>> FromIterator<(S, L)> for WalLocations {
    fn from_iter<I: IntoIterator<Item = (S, L)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(shard, location)| (shard.into(), location.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0/D525E3A8", Some(0xD525_E3A8))]
    #[case("AB/12345", Some((0xAB << 32) | 0x12345))]
    #[case("0/0", Some(0))]
    #[case("FFFFFFFF/1", Some(0xFFFF_FFFF_0000_0001))]
    #[case("garbage", None)]
    #[case("1/zz", None)]
    fn offset_parses_lsn(#[case] raw: &str, #[case] expected: Option<u64>) {
        assert_eq!(WalLocation::new(raw).offset(), expected);
    }

    #[test]
    fn merge_keeps_the_greater_offset_per_shard() {
        let mut stored: WalLocations = [("main", "0/2000"), ("ci", "1/0")].into_iter().collect();
        let incoming: WalLocations = [("main", "0/3000"), ("ci", "0/FFFF"), ("sec", "0/1")]
            .into_iter()
            .collect();

        assert!(stored.merge_latest(&incoming));

        assert_eq!(stored.get("main").unwrap().as_str(), "0/3000");
        assert_eq!(stored.get("ci").unwrap().as_str(), "1/0");
        assert_eq!(stored.get("sec").unwrap().as_str(), "0/1");
    }

    #[test]
    fn merge_is_a_noop_when_nothing_is_newer() {
        let mut stored: WalLocations = [("main", "0/3000")].into_iter().collect();
        let incoming: WalLocations = [("main", "0/2000")].into_iter().collect();

        assert!(!stored.merge_latest(&incoming));
        assert_eq!(stored.get("main").unwrap().as_str(), "0/3000");
    }

    #[test]
    fn unparseable_locations_never_win() {
        let mut stored: WalLocations = [("main", "0/10")].into_iter().collect();
        let junk: WalLocations = [("main", "junk")].into_iter().collect();
        assert!(!stored.merge_latest(&junk));

        let mut stored = junk.clone();
        let real: WalLocations = [("main", "0/10")].into_iter().collect();
        assert!(stored.merge_latest(&real));
        assert_eq!(stored.get("main").unwrap().as_str(), "0/10");
    }

    #[test]
    fn serializes_as_plain_map() {
        let locations: WalLocations = [("main", "0/D525E3A8"), ("ci", "AB/12345")].into_iter().collect();
        assert_eq!(
            serde_json::to_value(&locations).unwrap(),
            serde_json::json!({ "main": "0/D525E3A8", "ci": "AB/12345" })
        );
    }
}
