//! Args codec - 型付き引数と payload の `args` 配列の相互変換
//!
//! - 配列にシリアライズされる型（タプル、Vec）は要素がそのまま位置引数になる
//! - それ以外（数値、構造体）は 1 要素の配列に包む
//!
//! decode は配列全体として読めなければ単一要素として読み直します。

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::{DedupError, JobError};

pub fn encode_args<A: Serialize>(args: &A) -> Result<Vec<Value>, DedupError> {
    match serde_json::to_value(args)? {
        Value::Array(values) => Ok(values),
        other => Ok(vec![other]),
    }
}

/// 壊れた引数はリトライしても直らないので permanent 扱い
pub fn decode_args<A: DeserializeOwned>(args: &[Value]) -> Result<A, JobError> {
    let whole = serde_json::from_value(Value::Array(args.to_vec()));
    match (whole, args) {
        (Ok(decoded), _) => Ok(decoded),
        (Err(_), [single]) => serde_json::from_value(single.clone())
            .map_err(|e| JobError::permanent(format!("args decode: {e}"))),
        (Err(e), _) => Err(JobError::permanent(format!("args decode: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorKind;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Options {
        force: bool,
    }

    #[test]
    fn tuples_become_positional_args() {
        let args = encode_args(&(7_i64, "full")).unwrap();
        assert_eq!(args, vec![json!(7), json!("full")]);

        let back: (i64, String) = decode_args(&args).unwrap();
        assert_eq!(back, (7, "full".to_string()));
    }

    #[test]
    fn scalars_and_structs_take_one_slot() {
        assert_eq!(encode_args(&42_i64).unwrap(), vec![json!(42)]);
        assert_eq!(decode_args::<i64>(&[json!(42)]).unwrap(), 42);

        let args = encode_args(&Options { force: true }).unwrap();
        assert_eq!(args, vec![json!({ "force": true })]);
        assert_eq!(decode_args::<Options>(&args).unwrap(), Options { force: true });
    }

    #[test]
    fn mismatched_args_are_permanent_errors() {
        let err = decode_args::<(i64, i64)>(&[json!("nope")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.message().starts_with("args decode"));
    }
}
