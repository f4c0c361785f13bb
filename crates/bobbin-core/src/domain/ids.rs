//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom type
//! jid（ジョブ ID）と lease token（排他ロックの所有者）は同じ 128-bit ULID を
//! 中身に持ちますが、`Id<T>` のマーカー型で区別します。
//!
//! - **時刻でソート可能**: enqueue 順に並ぶのでログで追いやすい
//! - **分散生成可能**: ワーカー間で調整なしに発行できる
//! - **文字列表現**: payload や store には `"{prefix}{ulid}"` の文字列で載る

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display / FromStr で使うプレフィックス（"jid-", "lease-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData なので実行時のサイズは ULID と同じ 16 bytes です。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// IdParseError は文字列から ID を復元できなかったときのエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {prefix}id: {input:?}")]
pub struct IdParseError {
    prefix: &'static str,
    input: String,
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = IdParseError;

    /// プレフィックスは省略可（外部のハーネスが素の ULID を渡してくる場合がある）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| IdParseError {
                prefix: T::prefix(),
                input: s.to_string(),
            })
    }
}

// payload / cookie 上では文字列として扱う
impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "jid-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lease {}

impl IdMarker for Lease {
    fn prefix() -> &'static str {
        "lease-"
    }
}

/// Identifier assigned to every enqueue of a job.
pub type Jid = Id<Job>;

/// Owner token of an exclusive lease.
pub type LeaseToken = Id<Lease>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_prefix() {
        let ulid = Ulid::new();
        let jid = Jid::from_ulid(ulid);
        let token = LeaseToken::from_ulid(ulid);

        assert_eq!(jid.as_ulid(), token.as_ulid());
        assert!(jid.to_string().starts_with("jid-"));
        assert!(token.to_string().starts_with("lease-"));
        // let _: Jid = token; // <- does not compile
    }

    #[test]
    fn jid_parses_with_or_without_prefix() {
        let jid = Jid::from_ulid(Ulid::new());

        let prefixed: Jid = jid.to_string().parse().unwrap();
        let bare: Jid = jid.as_ulid().to_string().parse().unwrap();

        assert_eq!(prefixed, jid);
        assert_eq!(bare, jid);
        assert!("jid-not-a-ulid".parse::<Jid>().is_err());
    }

    #[test]
    fn jid_serializes_as_plain_string() {
        let jid = Jid::from_ulid(Ulid::new());

        let value = serde_json::to_value(jid).unwrap();
        assert_eq!(value, serde_json::Value::String(jid.to_string()));

        let back: Jid = serde_json::from_value(value).unwrap();
        assert_eq!(back, jid);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<Jid>(), size_of::<Ulid>());
        assert_eq!(size_of::<LeaseToken>(), 16);
    }
}
