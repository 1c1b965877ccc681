//! Conversions between Rust values and Soroban `ScVal`s.
//!
//! Contract structs arrive as maps keyed by field symbol; `Option<T>`
//! arrives as `Void` or the inner value; tuples and `Vec<T>` arrive as
//! `ScVal::Vec`.

use stellar_xdr::curr::{
    AccountId, BytesM, Hash, Int128Parts, PublicKey, ScAddress, ScBytes, ScMap, ScMapEntry,
    ScString, ScSymbol, ScVal, ScVec, StringM, Uint256,
};

use super::keys::{account_id_string, contract_id_string, parse_account_id, parse_contract_id};
use crate::types::{ChainPrice, Mission, MissionError, OraclePrice, UserStake};

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// `G…` or `C…` strkey as an `Address` value.
pub fn address(strkey: &str) -> Result<ScVal, MissionError> {
    let addr = if strkey.starts_with('C') {
        ScAddress::Contract(Hash(parse_contract_id(strkey)?))
    } else {
        ScAddress::Account(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(
            parse_account_id(strkey)?,
        ))))
    };
    Ok(ScVal::Address(addr))
}

pub fn i128(v: i128) -> ScVal {
    ScVal::I128(Int128Parts {
        hi: (v >> 64) as i64,
        lo: v as u64,
    })
}

pub fn u64(v: u64) -> ScVal {
    ScVal::U64(v)
}

pub fn u32(v: u32) -> ScVal {
    ScVal::U32(v)
}

pub fn symbol(s: &str) -> Result<ScVal, MissionError> {
    Ok(ScVal::Symbol(ScSymbol(StringM::try_from(s)?)))
}

pub fn string(s: &str) -> Result<ScVal, MissionError> {
    Ok(ScVal::String(ScString(StringM::try_from(s)?)))
}

pub fn bytes(b: &[u8]) -> Result<ScVal, MissionError> {
    Ok(ScVal::Bytes(ScBytes(BytesM::try_from(b.to_vec())?)))
}

pub fn vec(items: Vec<ScVal>) -> Result<ScVal, MissionError> {
    Ok(ScVal::Vec(Some(ScVec(items.try_into()?))))
}

/// A contract struct: a map keyed by field symbol, sorted by key.
pub fn record(fields: Vec<(&str, ScVal)>) -> Result<ScVal, MissionError> {
    let mut fields = fields;
    fields.sort_by(|a, b| a.0.cmp(b.0));
    let entries = fields
        .into_iter()
        .map(|(k, v)| Ok(ScMapEntry { key: symbol(k)?, val: v }))
        .collect::<Result<Vec<_>, MissionError>>()?;
    Ok(ScVal::Map(Some(ScMap(entries.try_into()?))))
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Types that can be read out of a contract return value.
pub trait FromScVal: Sized {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError>;
}

fn unexpected(expected: &str, got: &ScVal) -> MissionError {
    MissionError::Decode(format!("expected {expected}, got {got:?}"))
}

impl FromScVal for bool {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        match v {
            ScVal::Bool(b) => Ok(*b),
            other => Err(unexpected("bool", other)),
        }
    }
}

impl FromScVal for u32 {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        match v {
            ScVal::U32(n) => Ok(*n),
            other => Err(unexpected("u32", other)),
        }
    }
}

impl FromScVal for u64 {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        match v {
            ScVal::U64(n) => Ok(*n),
            ScVal::U32(n) => Ok(u64::from(*n)),
            ScVal::Timepoint(t) => Ok(t.0),
            other => Err(unexpected("u64", other)),
        }
    }
}

impl FromScVal for i128 {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        match v {
            ScVal::I128(parts) => Ok((i128::from(parts.hi) << 64) | i128::from(parts.lo)),
            ScVal::I64(n) => Ok(i128::from(*n)),
            ScVal::U64(n) => Ok(i128::from(*n)),
            ScVal::I32(n) => Ok(i128::from(*n)),
            ScVal::U32(n) => Ok(i128::from(*n)),
            other => Err(unexpected("i128", other)),
        }
    }
}

/// Symbols, strings and addresses (as strkeys) all decode to `String`.
impl FromScVal for String {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        match v {
            ScVal::Symbol(s) => Ok(s.0.to_utf8_string_lossy()),
            ScVal::String(s) => Ok(s.0.to_utf8_string_lossy()),
            ScVal::Address(ScAddress::Account(AccountId(PublicKey::PublicKeyTypeEd25519(
                Uint256(key),
            )))) => Ok(account_id_string(*key)),
            ScVal::Address(ScAddress::Contract(Hash(hash))) => Ok(contract_id_string(*hash)),
            other => Err(unexpected("string", other)),
        }
    }
}

impl<T: FromScVal> FromScVal for Option<T> {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        match v {
            ScVal::Void => Ok(None),
            other => T::from_scval(other).map(Some),
        }
    }
}

fn vec_items(v: &ScVal) -> Result<&[ScVal], MissionError> {
    match v {
        ScVal::Vec(Some(items)) => Ok(items.0.as_slice()),
        ScVal::Vec(None) => Ok(&[]),
        other => Err(unexpected("vec", other)),
    }
}

impl<T: FromScVal> FromScVal for Vec<T> {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        vec_items(v)?.iter().map(T::from_scval).collect()
    }
}

impl<A: FromScVal, B: FromScVal> FromScVal for (A, B) {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        match vec_items(v)? {
            [a, b] => Ok((A::from_scval(a)?, B::from_scval(b)?)),
            items => Err(MissionError::Decode(format!(
                "expected 2-tuple, got {} items",
                items.len()
            ))),
        }
    }
}

/// Field access over a decoded contract struct.
pub struct Fields<'a> {
    entries: &'a [ScMapEntry],
}

impl<'a> Fields<'a> {
    pub fn of(v: &'a ScVal) -> Result<Self, MissionError> {
        match v {
            ScVal::Map(Some(map)) => Ok(Self {
                entries: map.0.as_slice(),
            }),
            other => Err(unexpected("struct map", other)),
        }
    }

    pub fn get<T: FromScVal>(&self, name: &str) -> Result<T, MissionError> {
        let entry = self
            .entries
            .iter()
            .find(|e| matches!(&e.key, ScVal::Symbol(s) if s.0.as_slice() == name.as_bytes()))
            .ok_or_else(|| MissionError::Decode(format!("missing field `{name}`")))?;
        T::from_scval(&entry.val)
            .map_err(|e| MissionError::Decode(format!("field `{name}`: {e}")))
    }
}

impl FromScVal for Mission {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        let f = Fields::of(v)?;
        Ok(Mission {
            id: f.get("id")?,
            target_liquidity: f.get("target_liquidity")?,
            current_progress: f.get("current_progress")?,
            reward_pool: f.get("reward_pool")?,
            deadline: f.get("deadline")?,
            active: f.get("active")?,
            trigger_price: f.get("trigger_price")?,
            participants_count: f.get("participants_count")?,
        })
    }
}

impl FromScVal for UserStake {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        let f = Fields::of(v)?;
        Ok(UserStake {
            user: f.get("user")?,
            mission_id: f.get("mission_id")?,
            kale_staked: f.get("kale_staked")?,
            contribution: f.get("contribution")?,
            enlisted_at: f.get("enlisted_at")?,
        })
    }
}

impl FromScVal for ChainPrice {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        let f = Fields::of(v)?;
        Ok(ChainPrice {
            price: f.get("price")?,
            timestamp: f.get("timestamp")?,
        })
    }
}

impl FromScVal for OraclePrice {
    fn from_scval(v: &ScVal) -> Result<Self, MissionError> {
        let f = Fields::of(v)?;
        Ok(OraclePrice {
            asset: f.get("asset")?,
            price: f.get("price")?,
            timestamp: f.get("timestamp")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
