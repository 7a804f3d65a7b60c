//! Item condition expressions.
//!
//! Conditions are a small propositional + arithmetic dialect over single-char
//! operators (`=`, `~`, `!`, `&`, `|`, `<`, `>`), normalized here into
//! conventional two-char operators before parsing, with two custom
//! membership operators on the worn-item-template set: `=*` (present) and
//! `!*` (absent).
//!
//! Parameter identifiers:
//! `MP` movement points; `VI SA FO IN CH AG` stat totals and `vi sa fo in ch
//! ag` stat bases; `PN` lower-cased name; `PS` sex; `PG` class; `PB`
//! subscriber 0/1; `PK` kamas; `PO` worn item-template set; `PL` level; `PW`
//! wedding; `PA` alignment; `Pm` alignment level; `Pg` alignment gift; `Ps`
//! alignment specialization; `Pr` alignment grade; `PU` unusable.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, bail};
use chrono::Utc;
use emberproto::msgsvr::MsgSvr;
use emberproto::typ::{characteristic, item_pos, Characteristic, InfosChat, InfosMessageEntry};
use futures_util::future::BoxFuture;

use crate::error::SessionResult;
use crate::session::Session;

/// Strip `PJ[<>=]N(,N)?` clauses; the class/sex-role checks always pass.
fn strip_pj(s: &str) -> String {
    let b = s.as_bytes();
    let mut out = String::with_capacity(b.len());
    let mut i = 0;
    while i < b.len() {
        if b[i] == b'P'
            && i + 2 < b.len()
            && b[i + 1] == b'J'
            && matches!(b[i + 2], b'<' | b'>' | b'=')
        {
            let mut j = i + 3;
            let digits_start = j;
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            if j > digits_start {
                if j < b.len() && b[j] == b',' {
                    let mut k = j + 1;
                    let second_start = k;
                    while k < b.len() && b[k].is_ascii_digit() {
                        k += 1;
                    }
                    if k > second_start {
                        j = k;
                    }
                }
                out.push_str("true");
                i = j;
                continue;
            }
        }
        out.push(b[i] as char);
        i += 1;
    }
    out
}

/// Rewrite the single-char dialect into parseable operators.
pub fn normalize(conditions: &str) -> String {
    let s = strip_pj(conditions);
    let s = s
        .replace('=', "==")
        .replace('~', "==")
        .replace('!', "!=")
        .replace('&', "&&")
        .replace('|', "||");
    s.replace("PO==", "PO=*").replace("PO!=", "PO!*")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Set(HashSet<i32>),
}

pub type Params = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Ident(String),
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    NotIn,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Open,
    Close,
}

fn tokenize(s: &str) -> anyhow::Result<Vec<Token>> {
    let b = s.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < b.len() {
        let c = b[i];
        match c {
            b' ' | b'\t' => i += 1,
            b'0'..=b'9' => {
                let start = i;
                while i < b.len() && b[i].is_ascii_digit() {
                    i += 1;
                }
                tokens.push(Token::Int(s[start..i].parse()?));
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = i;
                while i < b.len() && (b[i].is_ascii_alphanumeric() || b[i] == b'_') {
                    i += 1;
                }
                tokens.push(Token::Ident(s[start..i].to_string()));
            }
            b'=' => {
                if b.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else if b.get(i + 1) == Some(&b'*') {
                    tokens.push(Token::In);
                    i += 2;
                } else {
                    bail!("stray '='");
                }
            }
            b'!' => match b.get(i + 1) {
                Some(&b'=') => {
                    tokens.push(Token::Ne);
                    i += 2;
                }
                Some(&b'*') => {
                    tokens.push(Token::NotIn);
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Not);
                    i += 1;
                }
            },
            b'<' => {
                if b.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            b'>' => {
                if b.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            b'&' => {
                if b.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    bail!("stray '&'");
                }
            }
            b'|' => {
                if b.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    bail!("stray '|'");
                }
            }
            b'+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            b'-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            b'*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            b'/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            b'(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            _ => bail!("unexpected character {:?}", c as char),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    params: &'a Params,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, t: &Token) -> bool {
        if self.peek() == Some(t) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> anyhow::Result<Value> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Value::Bool(as_bool(&left)? || as_bool(&right)?);
        }
        Ok(left)
    }

    fn and(&mut self) -> anyhow::Result<Value> {
        let mut left = self.comparison()?;
        while self.eat(&Token::And) {
            let right = self.comparison()?;
            left = Value::Bool(as_bool(&left)? && as_bool(&right)?);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> anyhow::Result<Value> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(
                t @ (Token::Eq
                | Token::Ne
                | Token::Lt
                | Token::Gt
                | Token::Le
                | Token::Ge
                | Token::In
                | Token::NotIn),
            ) => t.clone(),
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        compare(&op, &left, &right)
    }

    fn additive(&mut self) -> anyhow::Result<Value> {
        let mut left = self.multiplicative()?;
        loop {
            if self.eat(&Token::Plus) {
                let right = self.multiplicative()?;
                left = Value::Int(as_int(&left)? + as_int(&right)?);
            } else if self.eat(&Token::Minus) {
                let right = self.multiplicative()?;
                left = Value::Int(as_int(&left)? - as_int(&right)?);
            } else {
                return Ok(left);
            }
        }
    }

    fn multiplicative(&mut self) -> anyhow::Result<Value> {
        let mut left = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                let right = self.unary()?;
                left = Value::Int(as_int(&left)? * as_int(&right)?);
            } else if self.eat(&Token::Slash) {
                let right = self.unary()?;
                let divisor = as_int(&right)?;
                if divisor == 0 {
                    bail!("division by zero");
                }
                left = Value::Int(as_int(&left)? / divisor);
            } else {
                return Ok(left);
            }
        }
    }

    fn unary(&mut self) -> anyhow::Result<Value> {
        if self.eat(&Token::Minus) {
            let v = self.unary()?;
            return Ok(Value::Int(-as_int(&v)?));
        }
        if self.eat(&Token::Not) {
            let v = self.unary()?;
            return Ok(Value::Bool(!as_bool(&v)?));
        }
        self.primary()
    }

    fn primary(&mut self) -> anyhow::Result<Value> {
        match self.bump() {
            Some(Token::Int(v)) => Ok(Value::Int(v)),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => self
                    .params
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| anyhow!("unknown parameter: {name}")),
            },
            Some(Token::Open) => {
                let v = self.or()?;
                if !self.eat(&Token::Close) {
                    bail!("missing closing parenthesis");
                }
                Ok(v)
            }
            other => bail!("unexpected token: {other:?}"),
        }
    }
}

fn as_bool(v: &Value) -> anyhow::Result<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        _ => bail!("expected boolean, got {v:?}"),
    }
}

fn as_int(v: &Value) -> anyhow::Result<i64> {
    match v {
        Value::Int(v) => Ok(*v),
        _ => bail!("expected integer, got {v:?}"),
    }
}

fn compare(op: &Token, left: &Value, right: &Value) -> anyhow::Result<Value> {
    let out = match op {
        Token::In | Token::NotIn => {
            let Value::Set(set) = left else {
                bail!("membership needs the item set on the left");
            };
            let member = set.contains(&(as_int(right)? as i32));
            if *op == Token::In {
                member
            } else {
                !member
            }
        }
        Token::Eq | Token::Ne => {
            let eq = match (left, right) {
                (Value::Int(a), Value::Int(b)) => a == b,
                (Value::Bool(a), Value::Bool(b)) => a == b,
                (Value::Str(a), Value::Str(b)) => a == b,
                _ => bail!("cannot compare {left:?} and {right:?}"),
            };
            if *op == Token::Eq {
                eq
            } else {
                !eq
            }
        }
        Token::Lt => as_int(left)? < as_int(right)?,
        Token::Gt => as_int(left)? > as_int(right)?,
        Token::Le => as_int(left)? <= as_int(right)?,
        Token::Ge => as_int(left)? >= as_int(right)?,
        _ => bail!("not a comparison operator"),
    };
    Ok(Value::Bool(out))
}

/// Evaluate a normalized expression against the parameter map.
pub fn evaluate(expr: &str, params: &Params) -> anyhow::Result<Value> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        params,
    };
    let v = parser.or()?;
    if parser.pos != parser.tokens.len() {
        bail!("trailing tokens in condition");
    }
    Ok(v)
}

pub fn evaluate_bool(expr: &str, params: &Params) -> anyhow::Result<bool> {
    as_bool(&evaluate(expr, params)?)
}

/// Worn positions checked by the cascade; the mount check runs first.
const CHECKED_POSITIONS: &[i32] = &[
    item_pos::DRAGOTURKEY,
    item_pos::AMULET,
    item_pos::WEAPON,
    item_pos::RING_RIGHT,
    item_pos::BELT,
    item_pos::RING_LEFT,
    item_pos::BOOTS,
    item_pos::HAT,
    item_pos::CLOAK,
    item_pos::PET,
    item_pos::DOFUS_1,
    item_pos::DOFUS_1 + 1,
    item_pos::DOFUS_1 + 2,
    item_pos::DOFUS_1 + 3,
    item_pos::DOFUS_1 + 4,
    item_pos::DOFUS_6,
    item_pos::SHIELD,
    item_pos::MUTATION_ITEM,
    item_pos::BOOST_FOOD,
    item_pos::BLESSING_1,
    item_pos::BLESSING_2,
    item_pos::CURSE_1,
    item_pos::CURSE_2,
    item_pos::ROLEPLAY_BUFF,
    item_pos::FOLLOWING_CHARACTER,
];

impl Session {
    /// Re-check every worn item's conditions, unequipping offenders, and run
    /// again until a pass changes nothing.
    pub fn check_conditions(&mut self) -> BoxFuture<'_, SessionResult<()>> {
        Box::pin(async move {
            let account = self.server.repo.account(&self.account_id).await?;
            let subscription = i64::from(account.subscription >= Utc::now());

            let mut changed = false;

            for &position in CHECKED_POSITIONS {
                let character = self.server.repo.character(self.character_id).await?;

                if position == item_pos::DRAGOTURKEY {
                    if character.level() < 60 && character.mounting {
                        self.send(MsgSvr::MountEquipError { reason: 'R' }).await;
                        self.mount_or_dismount(false).await?;
                        changed = true;
                    }
                    continue;
                }

                let mut items = self
                    .server
                    .repo
                    .character_items_by_character_id(character.id)
                    .await?;
                items.retain(|_, v| {
                    v.position != item_pos::INVENTORY && !item_pos::is_hotbar(v.position)
                });

                let Some(item) = items.values().find(|v| v.position == position).cloned() else {
                    continue;
                };

                let template = self
                    .server
                    .static_cache
                    .items
                    .get(&item.item.template_id)
                    .ok_or_else(|| anyhow!("item template not found"))?;

                if template.level <= character.level() {
                    if template.conditions.is_empty() {
                        continue;
                    }

                    let normalized = normalize(&template.conditions);

                    let worn_templates: HashSet<i32> =
                        items.values().map(|v| v.item.template_id).collect();

                    let characteristics = self.characteristics().await?;
                    let total = |id: i32| -> i64 {
                        characteristics
                            .get(&id)
                            .map(Characteristic::total)
                            .unwrap_or(0)
                            .into()
                    };
                    let base = |id: i32| -> i64 {
                        characteristics.get(&id).map(|c| c.base).unwrap_or(0).into()
                    };

                    let mut params = Params::new();
                    params.insert("MP".into(), Value::Int(total(characteristic::MP)));

                    params.insert("VI".into(), Value::Int(total(characteristic::VITALITY)));
                    params.insert("SA".into(), Value::Int(total(characteristic::WISDOM)));
                    params.insert("FO".into(), Value::Int(total(characteristic::STRENGTH)));
                    params.insert("IN".into(), Value::Int(total(characteristic::INTELLIGENCE)));
                    params.insert("CH".into(), Value::Int(total(characteristic::CHANCE)));
                    params.insert("AG".into(), Value::Int(total(characteristic::AGILITY)));

                    params.insert("vi".into(), Value::Int(base(characteristic::VITALITY)));
                    params.insert("sa".into(), Value::Int(base(characteristic::WISDOM)));
                    params.insert("fo".into(), Value::Int(base(characteristic::STRENGTH)));
                    params.insert("in".into(), Value::Int(base(characteristic::INTELLIGENCE)));
                    params.insert("ch".into(), Value::Int(base(characteristic::CHANCE)));
                    params.insert("ag".into(), Value::Int(base(characteristic::AGILITY)));

                    params.insert("PN".into(), Value::Str(character.name.to_lowercase()));
                    params.insert("PS".into(), Value::Int(character.sex.into()));
                    params.insert("PG".into(), Value::Int(character.class_id.into()));
                    params.insert("PB".into(), Value::Int(subscription));
                    // Kama checks are disabled on this server.
                    params.insert("PK".into(), Value::Int(i64::from(i32::MAX)));
                    params.insert("PO".into(), Value::Set(worn_templates));
                    params.insert("PL".into(), Value::Int(character.level().into()));
                    params.insert("PW".into(), Value::Int(0));

                    params.insert("PA".into(), Value::Int(character.alignment.into()));
                    params.insert("Pm".into(), Value::Int(100));
                    params.insert("Pg".into(), Value::Int(0));
                    params.insert("Ps".into(), Value::Int(0));
                    params.insert("Pr".into(), Value::Int(character.grade().into()));

                    params.insert("PU".into(), Value::Str(String::new()));

                    if evaluate_bool(&normalized, &params)? {
                        continue;
                    }
                }

                self.send(MsgSvr::InfosMessage {
                    chat: InfosChat::Error,
                    messages: vec![InfosMessageEntry::new(19), InfosMessageEntry::new(44)],
                })
                .await;

                self.un_equip(item.id).await?;

                changed = true;
            }

            if changed {
                self.check_conditions().await?;
            }

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Params {
        let mut p = Params::new();
        p.insert("FO".into(), Value::Int(150));
        p.insert("SA".into(), Value::Int(80));
        p.insert("PL".into(), Value::Int(42));
        p.insert("PN".into(), Value::Str("toto".into()));
        p.insert("PO".into(), Value::Set([788, 1450].into_iter().collect()));
        p
    }

    #[test]
    fn normalizes_single_char_operators() {
        assert_eq!(normalize("FO>100&SA>60"), "FO>100&&SA>60");
        assert_eq!(normalize("PL=42|FO<10"), "PL==42||FO<10");
        assert_eq!(normalize("PO=788"), "PO=*788");
        assert_eq!(normalize("PO!788"), "PO!*788");
        assert_eq!(normalize("PJ=64,100&FO>50"), "true&&FO>50");
    }

    #[test]
    fn evaluates_propositional_logic() {
        let p = params();
        assert!(evaluate_bool(&normalize("FO>100&SA>60"), &p).unwrap());
        assert!(!evaluate_bool(&normalize("FO>100&SA>100"), &p).unwrap());
        assert!(evaluate_bool(&normalize("FO>200|SA>60"), &p).unwrap());
    }

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        let p = params();
        assert!(evaluate_bool(&normalize("FO+SA*2>300"), &p).unwrap());
        assert!(evaluate_bool(&normalize("(FO+SA)*2>300"), &p).unwrap());
        assert!(!evaluate_bool(&normalize("FO+SA*2>400"), &p).unwrap());
    }

    #[test]
    fn membership_operators_use_the_item_set() {
        let p = params();
        assert!(evaluate_bool(&normalize("PO=788"), &p).unwrap());
        assert!(!evaluate_bool(&normalize("PO=789"), &p).unwrap());
        assert!(evaluate_bool(&normalize("PO!789"), &p).unwrap());
        assert!(!evaluate_bool(&normalize("PO!1450"), &p).unwrap());
    }

    #[test]
    fn equality_rewrites_apply() {
        let p = params();
        assert!(evaluate_bool(&normalize("PL=42"), &p).unwrap());
        assert!(evaluate_bool(&normalize("PL~42"), &p).unwrap());
        assert!(evaluate_bool(&normalize("PL!41"), &p).unwrap());
    }

    #[test]
    fn pj_clauses_always_pass() {
        let p = params();
        assert!(evaluate_bool(&normalize("PJ>3"), &p).unwrap());
        assert!(evaluate_bool(&normalize("PJ=64,100"), &p).unwrap());
    }

    #[test]
    fn unknown_parameter_is_an_error() {
        let p = params();
        assert!(evaluate_bool(&normalize("ZZ>3"), &p).is_err());
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        let p = params();
        assert!(evaluate_bool("PL==42 42", &p).is_err());
    }
}
