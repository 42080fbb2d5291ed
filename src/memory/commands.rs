//! Command Handler
//!
//! Executes store commands against a [`Store`] and answers with RESP frames,
//! exactly as a server would send them back.
//!
//! ## Supported Commands
//!
//! ### String Commands
//! `SET key value [EX s | PX ms] [NX | XX] [GET]`, `GET`, `GETSET`, `GETDEL`,
//! `SETNX`, `SETEX`, `PSETEX`, `APPEND`, `STRLEN`, `INCR`, `INCRBY`, `DECR`,
//! `DECRBY`, `INCRBYFLOAT`, `MGET`, `MSET`, `MSETNX`
//!
//! ### Key Commands
//! `DEL`, `UNLINK`, `EXISTS`, `TOUCH`, `EXPIRE`, `PEXPIRE`, `TTL`, `PTTL`,
//! `PERSIST`, `TYPE`, `RENAME`, `RENAMENX`, `KEYS`
//!
//! ### Hash Commands
//! `HSET`, `HMSET`, `HSETNX`, `HGET`, `HMGET`, `HGETALL`, `HDEL`, `HEXISTS`,
//! `HLEN`, `HKEYS`, `HVALS`, `HINCRBY`
//!
//! ### List Commands
//! `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LLEN`, `LRANGE`, `LINDEX`
//!
//! ### Sorted Set Commands
//! `ZADD`, `ZCARD`, `ZSCORE`, `ZMSCORE`, `ZINCRBY`, `ZREM`, `ZCOUNT`, `ZRANK`,
//! `ZRANGE key start stop [BYSCORE] [REV] [WITHSCORES]`, `ZREVRANGE`,
//! `ZRANGESTORE`, `ZPOPMIN`, `ZPOPMAX`, `ZDIFF`, `ZDIFFSTORE`
//!
//! ### Server Commands
//! `PING`, `ECHO`, `DBSIZE`, `FLUSHDB`, `FLUSHALL`, `SELECT`
//!
//! Hashes are answered with RESP3 maps and scores with RESP3 doubles.

use super::store::{Data, Entry, Store};
use crate::protocol::RespValue;
use crate::value::format_float;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER: &str = "ERR value is not an integer or out of range";
const NOT_FLOAT: &str = "ERR value is not a valid float";
const SYNTAX: &str = "ERR syntax error";

/// Either the reply or the error message to answer with.
type Reply = Result<RespValue, String>;

fn wrong_args(cmd: &str) -> String {
    format!("ERR wrong number of arguments for '{}' command", cmd.to_lowercase())
}

fn parse_int(arg: &[u8]) -> Result<i64, String> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| NOT_INTEGER.to_string())
}

fn parse_float(arg: &[u8]) -> Result<f64, String> {
    let text = std::str::from_utf8(arg).map_err(|_| NOT_FLOAT.to_string())?;
    match text.to_ascii_lowercase().as_str() {
        "+inf" | "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        other => other
            .parse::<f64>()
            .ok()
            .filter(|f| !f.is_nan())
            .ok_or_else(|| NOT_FLOAT.to_string()),
    }
}

fn upper(arg: &[u8]) -> String {
    String::from_utf8_lossy(arg).to_ascii_uppercase()
}

fn bulk_or_null(value: Option<Bytes>) -> RespValue {
    value.map(RespValue::bulk_string).unwrap_or(RespValue::Null)
}

fn bulk_array(values: impl IntoIterator<Item = Bytes>) -> RespValue {
    RespValue::Array(values.into_iter().map(RespValue::BulkString).collect())
}

/// Resolves redis style `start`/`stop` indices (negative counts from the end)
/// to a half-open range over `len` items.
fn index_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize + 1))
}

/// One end of a score interval: `1.5`, `(1.5` (exclusive), `-inf`, `+inf`.
#[derive(Debug, Clone, Copy)]
struct ScoreBound {
    value: f64,
    exclusive: bool,
}

impl ScoreBound {
    fn parse(arg: &[u8]) -> Result<Self, String> {
        let (exclusive, rest) = match arg.first() {
            Some(b'(') => (true, &arg[1..]),
            _ => (false, arg),
        };
        let value = parse_float(rest)
            .map_err(|_| "ERR min or max is not a float".to_string())?;
        Ok(Self { value, exclusive })
    }

    fn below(&self, score: f64) -> bool {
        if self.exclusive {
            self.value < score
        } else {
            self.value <= score
        }
    }

    fn above(&self, score: f64) -> bool {
        if self.exclusive {
            score < self.value
        } else {
            score <= self.value
        }
    }
}

/// Members ordered by score, then lexicographically.
fn ordered(zset: &HashMap<Bytes, f64>) -> Vec<(Bytes, f64)> {
    let mut members: Vec<(Bytes, f64)> = zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
    members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    members
}

fn score_reply(score: f64) -> RespValue {
    RespValue::Double(score)
}

fn with_scores(members: Vec<(Bytes, f64)>, scores: bool) -> RespValue {
    let mut out = Vec::with_capacity(members.len() * if scores { 2 } else { 1 });
    for (member, score) in members {
        out.push(RespValue::BulkString(member));
        if scores {
            out.push(score_reply(score));
        }
    }
    RespValue::Array(out)
}

/// Options shared by `ZRANGE` and `ZRANGESTORE`.
struct RangeQuery {
    start: Bytes,
    stop: Bytes,
    by_score: bool,
    rev: bool,
    with_scores: bool,
}

impl RangeQuery {
    fn parse(args: &[Bytes], allow_scores: bool) -> Result<Self, String> {
        let mut query = RangeQuery {
            start: args[0].clone(),
            stop: args[1].clone(),
            by_score: false,
            rev: false,
            with_scores: false,
        };
        for opt in &args[2..] {
            match upper(opt).as_str() {
                "BYSCORE" => query.by_score = true,
                "REV" => query.rev = true,
                "WITHSCORES" if allow_scores => query.with_scores = true,
                _ => return Err(SYNTAX.to_string()),
            }
        }
        Ok(query)
    }

    fn select(&self, zset: &HashMap<Bytes, f64>) -> Result<Vec<(Bytes, f64)>, String> {
        let mut members = ordered(zset);

        if self.by_score {
            // with REV the bounds are given max first
            let (min, max) = if self.rev {
                (&self.stop, &self.start)
            } else {
                (&self.start, &self.stop)
            };
            let (min, max) = (ScoreBound::parse(min)?, ScoreBound::parse(max)?);
            members.retain(|(_, score)| min.below(*score) && max.above(*score));
            if self.rev {
                members.reverse();
            }
            return Ok(members);
        }

        if self.rev {
            members.reverse();
        }
        let (start, stop) = (parse_int(&self.start)?, parse_int(&self.stop)?);
        Ok(match index_range(start, stop, members.len()) {
            Some((from, to)) => members.drain(from..to).collect(),
            None => Vec::new(),
        })
    }
}

/// Handles commands by dispatching them to the matching `cmd_*` method.
#[derive(Clone, Default)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Executes one command line (name first) and returns the reply frame.
    pub fn execute(&self, parts: &[Bytes]) -> RespValue {
        let Some((name, args)) = parts.split_first() else {
            return RespValue::error("ERR empty command");
        };

        let cmd = upper(name);
        match self.dispatch(&cmd, args) {
            Ok(reply) => reply,
            Err(msg) => RespValue::Error(msg),
        }
    }

    fn dispatch(&self, cmd: &str, args: &[Bytes]) -> Reply {
        match cmd {
            // String commands
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "GETSET" => self.cmd_getset(args),
            "GETDEL" => self.cmd_getdel(args),
            "SETNX" => self.cmd_setnx(args),
            "SETEX" => self.cmd_setex(args, Duration::from_secs),
            "PSETEX" => self.cmd_setex(args, Duration::from_millis),
            "APPEND" => self.cmd_append(args),
            "STRLEN" => self.cmd_strlen(args),
            "INCR" => self.cmd_incrby(cmd, args, 1, false),
            "DECR" => self.cmd_incrby(cmd, args, -1, false),
            "INCRBY" => self.cmd_incrby(cmd, args, 1, true),
            "DECRBY" => self.cmd_incrby(cmd, args, -1, true),
            "INCRBYFLOAT" => self.cmd_incrbyfloat(args),
            "MGET" => self.cmd_mget(args),
            "MSET" => self.cmd_mset(args, false),
            "MSETNX" => self.cmd_mset(args, true),

            // Key commands
            "DEL" | "UNLINK" => self.cmd_del(cmd, args),
            "EXISTS" | "TOUCH" => self.cmd_exists(cmd, args),
            "EXPIRE" => self.cmd_expire(args, Duration::from_secs),
            "PEXPIRE" => self.cmd_expire(args, Duration::from_millis),
            "TTL" => self.cmd_ttl(args, false),
            "PTTL" => self.cmd_ttl(args, true),
            "PERSIST" => self.cmd_persist(args),
            "TYPE" => self.cmd_type(args),
            "RENAME" => self.cmd_rename(args, false),
            "RENAMENX" => self.cmd_rename(args, true),
            "KEYS" => self.cmd_keys(args),

            // Hash commands
            "HSET" | "HMSET" => self.cmd_hset(cmd, args),
            "HSETNX" => self.cmd_hsetnx(args),
            "HGET" => self.cmd_hget(args),
            "HMGET" => self.cmd_hmget(args),
            "HGETALL" => self.cmd_hgetall(args),
            "HDEL" => self.cmd_hdel(args),
            "HEXISTS" => self.cmd_hexists(args),
            "HLEN" => self.cmd_hlen(args),
            "HKEYS" => self.cmd_hkeys(args, true),
            "HVALS" => self.cmd_hkeys(args, false),
            "HINCRBY" => self.cmd_hincrby(args),

            // List commands
            "LPUSH" => self.cmd_push(cmd, args, true),
            "RPUSH" => self.cmd_push(cmd, args, false),
            "LPOP" => self.cmd_pop(cmd, args, true),
            "RPOP" => self.cmd_pop(cmd, args, false),
            "LLEN" => self.cmd_llen(args),
            "LRANGE" => self.cmd_lrange(args),
            "LINDEX" => self.cmd_lindex(args),

            // Sorted set commands
            "ZADD" => self.cmd_zadd(args),
            "ZCARD" => self.cmd_zcard(args),
            "ZSCORE" => self.cmd_zscore(args),
            "ZMSCORE" => self.cmd_zmscore(args),
            "ZINCRBY" => self.cmd_zincrby(args),
            "ZREM" => self.cmd_zrem(args),
            "ZCOUNT" => self.cmd_zcount(args),
            "ZRANK" => self.cmd_zrank(args),
            "ZRANGE" => self.cmd_zrange(args),
            "ZREVRANGE" => self.cmd_zrevrange(args),
            "ZRANGESTORE" => self.cmd_zrangestore(args),
            "ZPOPMIN" => self.cmd_zpop(cmd, args, false),
            "ZPOPMAX" => self.cmd_zpop(cmd, args, true),
            "ZDIFF" => self.cmd_zdiff(args),
            "ZDIFFSTORE" => self.cmd_zdiffstore(args),

            // Server commands
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "DBSIZE" => Ok(RespValue::integer(self.store.len() as i64)),
            "FLUSHDB" | "FLUSHALL" => {
                self.store.flush();
                Ok(RespValue::ok())
            }
            "SELECT" => Ok(RespValue::ok()),

            _ => Err(format!("ERR unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Typed access helpers
    // ========================================================================

    fn get_string(&self, key: &[u8]) -> Result<Option<Bytes>, String> {
        self.store.read(key, |entry| match entry.map(|e| &e.data) {
            None => Ok(None),
            Some(Data::String(v)) => Ok(Some(v.clone())),
            Some(_) => Err(WRONGTYPE.to_string()),
        })
    }

    fn read_hash<R>(&self, key: &[u8], f: impl FnOnce(&HashMap<Bytes, Bytes>) -> R) -> Result<R, String> {
        self.store.read(key, |entry| match entry.map(|e| &e.data) {
            None => Ok(f(&HashMap::new())),
            Some(Data::Hash(h)) => Ok(f(h)),
            Some(_) => Err(WRONGTYPE.to_string()),
        })
    }

    fn update_hash<R>(
        &self,
        key: &Bytes,
        f: impl FnOnce(&mut HashMap<Bytes, Bytes>) -> Result<R, String>,
    ) -> Result<R, String> {
        self.store.update(key, |slot| {
            let entry = slot.get_or_insert_with(|| Entry::new(Data::Hash(HashMap::new())));
            match &mut entry.data {
                Data::Hash(h) => f(h),
                _ => Err(WRONGTYPE.to_string()),
            }
        })
    }

    fn read_list<R>(&self, key: &[u8], f: impl FnOnce(&VecDeque<Bytes>) -> R) -> Result<R, String> {
        self.store.read(key, |entry| match entry.map(|e| &e.data) {
            None => Ok(f(&VecDeque::new())),
            Some(Data::List(l)) => Ok(f(l)),
            Some(_) => Err(WRONGTYPE.to_string()),
        })
    }

    fn update_list<R>(&self, key: &Bytes, f: impl FnOnce(&mut VecDeque<Bytes>) -> R) -> Result<R, String> {
        self.store.update(key, |slot| {
            let entry = slot.get_or_insert_with(|| Entry::new(Data::List(VecDeque::new())));
            match &mut entry.data {
                Data::List(l) => Ok(f(l)),
                _ => Err(WRONGTYPE.to_string()),
            }
        })
    }

    fn read_zset<R>(&self, key: &[u8], f: impl FnOnce(&HashMap<Bytes, f64>) -> R) -> Result<R, String> {
        self.store.read(key, |entry| match entry.map(|e| &e.data) {
            None => Ok(f(&HashMap::new())),
            Some(Data::ZSet(z)) => Ok(f(z)),
            Some(_) => Err(WRONGTYPE.to_string()),
        })
    }

    fn update_zset<R>(
        &self,
        key: &Bytes,
        f: impl FnOnce(&mut HashMap<Bytes, f64>) -> Result<R, String>,
    ) -> Result<R, String> {
        self.store.update(key, |slot| {
            let entry = slot.get_or_insert_with(|| Entry::new(Data::ZSet(HashMap::new())));
            match &mut entry.data {
                Data::ZSet(z) => f(z),
                _ => Err(WRONGTYPE.to_string()),
            }
        })
    }

    // ========================================================================
    // String Commands
    // ========================================================================

    /// SET key value [EX seconds] [PX milliseconds] [NX|XX] [GET]
    fn cmd_set(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return Err(wrong_args("SET"));
        }
        let (key, value) = (&args[0], &args[1]);

        let mut ttl: Option<Duration> = None;
        let (mut nx, mut xx, mut get) = (false, false, false);

        let mut i = 2;
        while i < args.len() {
            match upper(&args[i]).as_str() {
                opt @ ("EX" | "PX") => {
                    i += 1;
                    let amount = args.get(i).ok_or_else(|| SYNTAX.to_string())?;
                    let amount = match parse_int(amount)? {
                        n if n > 0 => n as u64,
                        _ => return Err("ERR invalid expire time in 'set' command".to_string()),
                    };
                    ttl = Some(if opt == "EX" {
                        Duration::from_secs(amount)
                    } else {
                        Duration::from_millis(amount)
                    });
                }
                "NX" => nx = true,
                "XX" => xx = true,
                "GET" => get = true,
                _ => return Err(SYNTAX.to_string()),
            }
            i += 1;
        }
        if nx && xx {
            return Err(SYNTAX.to_string());
        }

        self.store.update(key, |slot| {
            let old = match slot.as_ref().map(|e| &e.data) {
                Some(Data::String(v)) => Some(v.clone()),
                Some(_) if get => return Err(WRONGTYPE.to_string()),
                _ => None,
            };
            let exists = slot.is_some();

            if (nx && exists) || (xx && !exists) {
                return Ok(if get { bulk_or_null(old) } else { RespValue::Null });
            }

            let data = Data::String(value.clone());
            *slot = Some(match ttl {
                Some(ttl) => Entry::with_ttl(data, ttl),
                None => Entry::new(data),
            });

            Ok(if get { bulk_or_null(old) } else { RespValue::ok() })
        })
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args("GET"));
        }
        Ok(bulk_or_null(self.get_string(&args[0])?))
    }

    /// GETSET key value
    fn cmd_getset(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return Err(wrong_args("GETSET"));
        }
        self.cmd_set(&[args[0].clone(), args[1].clone(), Bytes::from_static(b"GET")])
    }

    /// GETDEL key
    fn cmd_getdel(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args("GETDEL"));
        }
        self.store.update(&args[0], |slot| match slot.as_ref().map(|e| &e.data) {
            None => Ok(RespValue::Null),
            Some(Data::String(v)) => {
                let value = v.clone();
                *slot = None;
                Ok(RespValue::bulk_string(value))
            }
            Some(_) => Err(WRONGTYPE.to_string()),
        })
    }

    /// SETNX key value
    fn cmd_setnx(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return Err(wrong_args("SETNX"));
        }
        let created = self.store.update(&args[0], |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Entry::new(Data::String(args[1].clone())));
            true
        });
        Ok(RespValue::integer(created as i64))
    }

    /// SETEX key seconds value / PSETEX key milliseconds value
    fn cmd_setex(&self, args: &[Bytes], unit: fn(u64) -> Duration) -> Reply {
        if args.len() != 3 {
            return Err(wrong_args("SETEX"));
        }
        let ttl = match parse_int(&args[1])? {
            n if n > 0 => unit(n as u64),
            _ => return Err("ERR invalid expire time in 'setex' command".to_string()),
        };
        self.store.insert(
            args[0].clone(),
            Entry::with_ttl(Data::String(args[2].clone()), ttl),
        );
        Ok(RespValue::ok())
    }

    /// APPEND key value
    fn cmd_append(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return Err(wrong_args("APPEND"));
        }
        self.store.update(&args[0], |slot| {
            let entry = slot.get_or_insert_with(|| Entry::new(Data::String(Bytes::new())));
            match &mut entry.data {
                Data::String(v) => {
                    let mut joined = Vec::with_capacity(v.len() + args[1].len());
                    joined.extend_from_slice(v);
                    joined.extend_from_slice(&args[1]);
                    *v = Bytes::from(joined);
                    Ok(RespValue::integer(v.len() as i64))
                }
                _ => Err(WRONGTYPE.to_string()),
            }
        })
    }

    /// STRLEN key
    fn cmd_strlen(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args("STRLEN"));
        }
        let len = self.get_string(&args[0])?.map(|v| v.len()).unwrap_or(0);
        Ok(RespValue::integer(len as i64))
    }

    /// INCR/DECR key, INCRBY/DECRBY key amount
    fn cmd_incrby(&self, cmd: &str, args: &[Bytes], sign: i64, by: bool) -> Reply {
        let expected = if by { 2 } else { 1 };
        if args.len() != expected {
            return Err(wrong_args(cmd));
        }
        let delta = if by { parse_int(&args[1])? } else { 1 };
        let delta = delta.checked_mul(sign).ok_or_else(|| NOT_INTEGER.to_string())?;

        self.store.update(&args[0], |slot| {
            let entry = slot.get_or_insert_with(|| Entry::new(Data::String(Bytes::from_static(b"0"))));
            match &mut entry.data {
                Data::String(v) => {
                    let current = parse_int(v)?;
                    let next = current
                        .checked_add(delta)
                        .ok_or_else(|| "ERR increment or decrement would overflow".to_string())?;
                    *v = Bytes::from(next.to_string());
                    Ok(RespValue::integer(next))
                }
                _ => Err(WRONGTYPE.to_string()),
            }
        })
    }

    /// INCRBYFLOAT key increment
    fn cmd_incrbyfloat(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return Err(wrong_args("INCRBYFLOAT"));
        }
        let delta = parse_float(&args[1])?;

        self.store.update(&args[0], |slot| {
            let entry = slot.get_or_insert_with(|| Entry::new(Data::String(Bytes::from_static(b"0"))));
            match &mut entry.data {
                Data::String(v) => {
                    let next = parse_float(v)? + delta;
                    if !next.is_finite() {
                        return Err("ERR increment would produce NaN or Infinity".to_string());
                    }
                    *v = Bytes::from(format_float(next));
                    Ok(RespValue::bulk_string(v.clone()))
                }
                _ => Err(WRONGTYPE.to_string()),
            }
        })
    }

    /// MGET key [key ...]
    fn cmd_mget(&self, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return Err(wrong_args("MGET"));
        }
        let values = args
            .iter()
            .map(|key| bulk_or_null(self.get_string(key).ok().flatten()))
            .collect();
        Ok(RespValue::Array(values))
    }

    /// MSET key value [key value ...] / MSETNX
    fn cmd_mset(&self, args: &[Bytes], nx: bool) -> Reply {
        if args.is_empty() || args.len() % 2 != 0 {
            return Err(wrong_args(if nx { "MSETNX" } else { "MSET" }));
        }

        if nx && args.chunks(2).any(|pair| self.store.exists(&pair[0])) {
            return Ok(RespValue::integer(0));
        }

        for pair in args.chunks(2) {
            self.store
                .insert(pair[0].clone(), Entry::new(Data::String(pair[1].clone())));
        }

        Ok(if nx {
            RespValue::integer(1)
        } else {
            RespValue::ok()
        })
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// DEL key [key ...]
    fn cmd_del(&self, cmd: &str, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return Err(wrong_args(cmd));
        }
        let deleted = args
            .iter()
            .filter(|key| self.store.remove(key).is_some())
            .count();
        Ok(RespValue::integer(deleted as i64))
    }

    /// EXISTS key [key ...]
    fn cmd_exists(&self, cmd: &str, args: &[Bytes]) -> Reply {
        if args.is_empty() {
            return Err(wrong_args(cmd));
        }
        let count = args.iter().filter(|key| self.store.exists(key)).count();
        Ok(RespValue::integer(count as i64))
    }

    /// EXPIRE key seconds / PEXPIRE key milliseconds
    fn cmd_expire(&self, args: &[Bytes], unit: fn(u64) -> Duration) -> Reply {
        if args.len() != 2 {
            return Err(wrong_args("EXPIRE"));
        }
        let amount = parse_int(&args[1])?;

        let updated = self.store.update(&args[0], |slot| {
            if slot.is_none() {
                return false;
            }
            if amount <= 0 {
                *slot = None;
            } else if let Some(entry) = slot {
                entry.expires_at = Some(Instant::now() + unit(amount as u64));
            }
            true
        });
        Ok(RespValue::integer(updated as i64))
    }

    /// TTL key / PTTL key
    fn cmd_ttl(&self, args: &[Bytes], millis: bool) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args(if millis { "PTTL" } else { "TTL" }));
        }
        let ttl = self.store.read(&args[0], |entry| match entry {
            None => -2,
            Some(entry) => match entry.ttl() {
                None => -1,
                Some(left) if millis => left.as_millis() as i64,
                Some(left) => left.as_secs_f64().round() as i64,
            },
        });
        Ok(RespValue::integer(ttl))
    }

    /// PERSIST key
    fn cmd_persist(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args("PERSIST"));
        }
        let persisted = self.store.update(&args[0], |slot| match slot {
            Some(entry) if entry.expires_at.is_some() => {
                entry.expires_at = None;
                true
            }
            _ => false,
        });
        Ok(RespValue::integer(persisted as i64))
    }

    /// TYPE key
    fn cmd_type(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args("TYPE"));
        }
        let name = self
            .store
            .read(&args[0], |entry| entry.map(|e| e.data.type_name()))
            .unwrap_or("none");
        Ok(RespValue::simple_string(name))
    }

    /// RENAME key newkey / RENAMENX key newkey
    fn cmd_rename(&self, args: &[Bytes], nx: bool) -> Reply {
        if args.len() != 2 {
            return Err(wrong_args(if nx { "RENAMENX" } else { "RENAME" }));
        }
        if !self.store.exists(&args[0]) {
            return Err("ERR no such key".to_string());
        }
        if nx && self.store.exists(&args[1]) {
            return Ok(RespValue::integer(0));
        }

        if let Some(entry) = self.store.remove(&args[0]) {
            self.store.insert(args[1].clone(), entry);
        }

        Ok(if nx {
            RespValue::integer(1)
        } else {
            RespValue::ok()
        })
    }

    /// KEYS pattern
    fn cmd_keys(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args("KEYS"));
        }
        Ok(bulk_array(self.store.keys(&args[0])))
    }

    // ========================================================================
    // Hash Commands
    // ========================================================================

    /// HSET key field value [field value ...]
    fn cmd_hset(&self, cmd: &str, args: &[Bytes]) -> Reply {
        if args.len() < 3 || args.len() % 2 == 0 {
            return Err(wrong_args(cmd));
        }
        let added = self.update_hash(&args[0], |hash| {
            Ok(args[1..]
                .chunks(2)
                .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                .count())
        })?;
        Ok(if cmd == "HMSET" {
            RespValue::ok()
        } else {
            RespValue::integer(added as i64)
        })
    }

    /// HSETNX key field value
    fn cmd_hsetnx(&self, args: &[Bytes]) -> Reply {
        if args.len() != 3 {
            return Err(wrong_args("HSETNX"));
        }
        let set = self.update_hash(&args[0], |hash| {
            if hash.contains_key(&args[1]) {
                return Ok(false);
            }
            hash.insert(args[1].clone(), args[2].clone());
            Ok(true)
        })?;
        Ok(RespValue::integer(set as i64))
    }

    /// HGET key field
    fn cmd_hget(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return Err(wrong_args("HGET"));
        }
        let value = self.read_hash(&args[0], |hash| hash.get(&args[1]).cloned())?;
        Ok(bulk_or_null(value))
    }

    /// HMGET key field [field ...]
    fn cmd_hmget(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return Err(wrong_args("HMGET"));
        }
        self.read_hash(&args[0], |hash| {
            RespValue::Array(
                args[1..]
                    .iter()
                    .map(|field| bulk_or_null(hash.get(field).cloned()))
                    .collect(),
            )
        })
    }

    /// HGETALL key
    fn cmd_hgetall(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args("HGETALL"));
        }
        self.read_hash(&args[0], |hash| {
            RespValue::Map(
                hash.iter()
                    .map(|(f, v)| (RespValue::BulkString(f.clone()), RespValue::BulkString(v.clone())))
                    .collect(),
            )
        })
    }

    /// HDEL key field [field ...]
    fn cmd_hdel(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return Err(wrong_args("HDEL"));
        }
        if !self.store.exists(&args[0]) {
            return Ok(RespValue::integer(0));
        }
        let removed = self.update_hash(&args[0], |hash| {
            Ok(args[1..].iter().filter(|f| hash.remove(*f).is_some()).count())
        })?;
        Ok(RespValue::integer(removed as i64))
    }

    /// HEXISTS key field
    fn cmd_hexists(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return Err(wrong_args("HEXISTS"));
        }
        let exists = self.read_hash(&args[0], |hash| hash.contains_key(&args[1]))?;
        Ok(RespValue::integer(exists as i64))
    }

    /// HLEN key
    fn cmd_hlen(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args("HLEN"));
        }
        let len = self.read_hash(&args[0], |hash| hash.len())?;
        Ok(RespValue::integer(len as i64))
    }

    /// HKEYS key / HVALS key
    fn cmd_hkeys(&self, args: &[Bytes], keys: bool) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args(if keys { "HKEYS" } else { "HVALS" }));
        }
        self.read_hash(&args[0], |hash| {
            if keys {
                bulk_array(hash.keys().cloned())
            } else {
                bulk_array(hash.values().cloned())
            }
        })
    }

    /// HINCRBY key field increment
    fn cmd_hincrby(&self, args: &[Bytes]) -> Reply {
        if args.len() != 3 {
            return Err(wrong_args("HINCRBY"));
        }
        let delta = parse_int(&args[2])?;
        let next = self.update_hash(&args[0], |hash| {
            let current = match hash.get(&args[1]) {
                Some(v) => parse_int(v).map_err(|_| "ERR hash value is not an integer".to_string())?,
                None => 0,
            };
            let next = current
                .checked_add(delta)
                .ok_or_else(|| "ERR increment or decrement would overflow".to_string())?;
            hash.insert(args[1].clone(), Bytes::from(next.to_string()));
            Ok(next)
        })?;
        Ok(RespValue::integer(next))
    }

    // ========================================================================
    // List Commands
    // ========================================================================

    /// LPUSH/RPUSH key element [element ...]
    fn cmd_push(&self, cmd: &str, args: &[Bytes], left: bool) -> Reply {
        if args.len() < 2 {
            return Err(wrong_args(cmd));
        }
        let len = self.update_list(&args[0], |list| {
            for value in &args[1..] {
                if left {
                    list.push_front(value.clone());
                } else {
                    list.push_back(value.clone());
                }
            }
            list.len()
        })?;
        Ok(RespValue::integer(len as i64))
    }

    /// LPOP/RPOP key [count]
    fn cmd_pop(&self, cmd: &str, args: &[Bytes], left: bool) -> Reply {
        if args.is_empty() || args.len() > 2 {
            return Err(wrong_args(cmd));
        }
        let count = match args.get(1) {
            Some(n) => Some(parse_int(n)?.max(0) as usize),
            None => None,
        };
        if !self.store.exists(&args[0]) {
            return Ok(RespValue::Null);
        }

        self.update_list(&args[0], |list| {
            let mut pop = || if left { list.pop_front() } else { list.pop_back() };
            match count {
                None => bulk_or_null(pop()),
                Some(n) => bulk_array((0..n).map_while(|_| pop())),
            }
        })
    }

    /// LLEN key
    fn cmd_llen(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args("LLEN"));
        }
        let len = self.read_list(&args[0], |list| list.len())?;
        Ok(RespValue::integer(len as i64))
    }

    /// LRANGE key start stop
    fn cmd_lrange(&self, args: &[Bytes]) -> Reply {
        if args.len() != 3 {
            return Err(wrong_args("LRANGE"));
        }
        let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
        self.read_list(&args[0], |list| match index_range(start, stop, list.len()) {
            Some((from, to)) => bulk_array(list.range(from..to).cloned()),
            None => RespValue::Array(vec![]),
        })
    }

    /// LINDEX key index
    fn cmd_lindex(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return Err(wrong_args("LINDEX"));
        }
        let index = parse_int(&args[1])?;
        self.read_list(&args[0], |list| {
            let idx = if index < 0 { list.len() as i64 + index } else { index };
            if idx < 0 {
                return RespValue::Null;
            }
            bulk_or_null(list.get(idx as usize).cloned())
        })
    }

    // ========================================================================
    // Sorted Set Commands
    // ========================================================================

    /// ZADD key score member [score member ...]
    fn cmd_zadd(&self, args: &[Bytes]) -> Reply {
        if args.len() < 3 || args.len() % 2 == 0 {
            return Err(wrong_args("ZADD"));
        }
        let pairs = args[1..]
            .chunks(2)
            .map(|pair| -> Result<(f64, Bytes), String> {
                Ok((parse_float(&pair[0])?, pair[1].clone()))
            })
            .collect::<Result<Vec<_>, String>>()?;

        let added = self.update_zset(&args[0], |zset| {
            Ok(pairs
                .into_iter()
                .filter(|(score, member)| zset.insert(member.clone(), *score).is_none())
                .count())
        })?;
        Ok(RespValue::integer(added as i64))
    }

    /// ZCARD key
    fn cmd_zcard(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return Err(wrong_args("ZCARD"));
        }
        let len = self.read_zset(&args[0], |zset| zset.len())?;
        Ok(RespValue::integer(len as i64))
    }

    /// ZSCORE key member
    fn cmd_zscore(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return Err(wrong_args("ZSCORE"));
        }
        let score = self.read_zset(&args[0], |zset| zset.get(&args[1]).copied())?;
        Ok(score.map(score_reply).unwrap_or(RespValue::Null))
    }

    /// ZMSCORE key member [member ...]
    fn cmd_zmscore(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return Err(wrong_args("ZMSCORE"));
        }
        self.read_zset(&args[0], |zset| {
            RespValue::Array(
                args[1..]
                    .iter()
                    .map(|m| zset.get(m).copied().map(score_reply).unwrap_or(RespValue::Null))
                    .collect(),
            )
        })
    }

    /// ZINCRBY key increment member
    fn cmd_zincrby(&self, args: &[Bytes]) -> Reply {
        if args.len() != 3 {
            return Err(wrong_args("ZINCRBY"));
        }
        let delta = parse_float(&args[1])?;
        let score = self.update_zset(&args[0], |zset| {
            let score = zset.entry(args[2].clone()).or_insert(0.0);
            *score += delta;
            Ok(*score)
        })?;
        Ok(score_reply(score))
    }

    /// ZREM key member [member ...]
    fn cmd_zrem(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return Err(wrong_args("ZREM"));
        }
        if !self.store.exists(&args[0]) {
            return Ok(RespValue::integer(0));
        }
        let removed = self.update_zset(&args[0], |zset| {
            Ok(args[1..].iter().filter(|m| zset.remove(*m).is_some()).count())
        })?;
        Ok(RespValue::integer(removed as i64))
    }

    /// ZCOUNT key min max
    fn cmd_zcount(&self, args: &[Bytes]) -> Reply {
        if args.len() != 3 {
            return Err(wrong_args("ZCOUNT"));
        }
        let (min, max) = (ScoreBound::parse(&args[1])?, ScoreBound::parse(&args[2])?);
        let count = self.read_zset(&args[0], |zset| {
            zset.values().filter(|s| min.below(**s) && max.above(**s)).count()
        })?;
        Ok(RespValue::integer(count as i64))
    }

    /// ZRANK key member
    fn cmd_zrank(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return Err(wrong_args("ZRANK"));
        }
        let rank = self.read_zset(&args[0], |zset| {
            ordered(zset).iter().position(|(m, _)| *m == args[1])
        })?;
        Ok(rank.map(|r| RespValue::integer(r as i64)).unwrap_or(RespValue::Null))
    }

    /// ZRANGE key start stop [BYSCORE] [REV] [WITHSCORES]
    fn cmd_zrange(&self, args: &[Bytes]) -> Reply {
        if args.len() < 3 {
            return Err(wrong_args("ZRANGE"));
        }
        let query = RangeQuery::parse(&args[1..], true)?;
        let members = self.read_zset(&args[0], |zset| query.select(zset))??;
        Ok(with_scores(members, query.with_scores))
    }

    /// ZREVRANGE key start stop [WITHSCORES]
    fn cmd_zrevrange(&self, args: &[Bytes]) -> Reply {
        if args.len() < 3 || args.len() > 4 {
            return Err(wrong_args("ZREVRANGE"));
        }
        let mut rewritten = args.to_vec();
        rewritten.push(Bytes::from_static(b"REV"));
        self.cmd_zrange(&rewritten)
    }

    /// ZRANGESTORE dst src start stop [BYSCORE] [REV]
    fn cmd_zrangestore(&self, args: &[Bytes]) -> Reply {
        if args.len() < 4 {
            return Err(wrong_args("ZRANGESTORE"));
        }
        let query = RangeQuery::parse(&args[2..], false)?;
        let members = self.read_zset(&args[1], |zset| query.select(zset))??;
        Ok(RespValue::integer(self.store_zset(&args[0], members) as i64))
    }

    /// Replaces `key` with a sorted set made of `members`.
    fn store_zset(&self, key: &Bytes, members: Vec<(Bytes, f64)>) -> usize {
        let len = members.len();
        self.store.update(key, |slot| {
            *slot = Some(Entry::new(Data::ZSet(members.into_iter().collect())));
        });
        len
    }

    /// ZPOPMIN/ZPOPMAX key [count]
    fn cmd_zpop(&self, cmd: &str, args: &[Bytes], max: bool) -> Reply {
        if args.is_empty() || args.len() > 2 {
            return Err(wrong_args(cmd));
        }
        let count = match args.get(1) {
            Some(n) => parse_int(n)?.max(0) as usize,
            None => 1,
        };
        if !self.store.exists(&args[0]) {
            return Ok(RespValue::Array(vec![]));
        }

        let popped = self.update_zset(&args[0], |zset| {
            let mut members = ordered(zset);
            if max {
                members.reverse();
            }
            members.truncate(count);
            for (member, _) in &members {
                zset.remove(member);
            }
            Ok(members)
        })?;
        Ok(with_scores(popped, true))
    }

    /// Members of the first set that are in none of the others.
    fn diff(&self, keys: &[Bytes]) -> Result<Vec<(Bytes, f64)>, String> {
        let mut result = self.read_zset(&keys[0], |zset| zset.clone())?;
        for key in &keys[1..] {
            self.read_zset(key, |other| result.retain(|m, _| !other.contains_key(m)))?;
        }
        let mut members: Vec<(Bytes, f64)> = result.into_iter().collect();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }

    /// Splits `numkeys key [key ...] [rest...]`.
    fn numkeys<'a>(cmd: &str, args: &'a [Bytes]) -> Result<(&'a [Bytes], &'a [Bytes]), String> {
        let n = parse_int(args.first().ok_or_else(|| wrong_args(cmd))?)?;
        if n < 1 {
            return Err(format!("ERR at least 1 input key is needed for '{}' command", cmd.to_lowercase()));
        }
        let n = n as usize;
        if args.len() < n + 1 {
            return Err(SYNTAX.to_string());
        }
        Ok((&args[1..=n], &args[n + 1..]))
    }

    /// ZDIFF numkeys key [key ...] [WITHSCORES]
    fn cmd_zdiff(&self, args: &[Bytes]) -> Reply {
        let (keys, rest) = Self::numkeys("ZDIFF", args)?;
        let scores = match rest {
            [] => false,
            [opt] if upper(opt) == "WITHSCORES" => true,
            _ => return Err(SYNTAX.to_string()),
        };
        Ok(with_scores(self.diff(keys)?, scores))
    }

    /// ZDIFFSTORE destination numkeys key [key ...]
    fn cmd_zdiffstore(&self, args: &[Bytes]) -> Reply {
        if args.len() < 3 {
            return Err(wrong_args("ZDIFFSTORE"));
        }
        let (keys, rest) = Self::numkeys("ZDIFFSTORE", &args[1..])?;
        if !rest.is_empty() {
            return Err(SYNTAX.to_string());
        }
        let members = self.diff(keys)?;
        Ok(RespValue::integer(self.store_zset(&args[0], members) as i64))
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[Bytes]) -> Reply {
        match args {
            [] => Ok(RespValue::simple_string("PONG")),
            [msg] => Ok(RespValue::bulk_string(msg.clone())),
            _ => Err(wrong_args("PING")),
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> Reply {
        match args {
            [msg] => Ok(RespValue::bulk_string(msg.clone())),
            _ => Err(wrong_args("ECHO")),
        }
    }
}
