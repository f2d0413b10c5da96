//! The embedded store's data and the subset of Redis commands scripts can call.

use std::collections::HashMap;

use super::clock::Clock;
use super::sorted_set::{ScoreBound, SortedSet};
use crate::store::Reply;

/// All sorted sets held by an embedded store, by key.
#[derive(Debug, Default)]
pub struct Keyspace {
    sets: HashMap<Vec<u8>, SortedSet>,
}

type CommandResult = std::result::Result<Reply, String>;

impl Keyspace {
    /// Run one command. `argv[0]` is the command name (case-insensitive).
    /// Errors are Redis-style error strings.
    pub fn execute(&mut self, clock: &dyn Clock, argv: &[Vec<u8>]) -> CommandResult {
        let Some(name) = argv.first() else {
            return Err("ERR Please specify at least one argument for this redis lib call".into());
        };
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();
        let args = &argv[1..];
        match name.as_str() {
            "TIME" => Ok(time(clock)),
            "ZADD" => self.zadd(args),
            "ZRANGE" => self.zrange(args),
            "ZRANGEBYSCORE" => self.zrangebyscore(args),
            "ZREM" => self.zrem(args),
            "ZCARD" => self.zcard(args),
            "ZSCORE" => self.zscore(args),
            "DEL" => self.del(args),
            _ => Err(format!("ERR unknown command '{}'", name.to_lowercase())),
        }
    }

    fn zadd(&mut self, args: &[Vec<u8>]) -> CommandResult {
        let key = args.first().ok_or_else(|| arity("zadd"))?;
        let mut nx = false;
        let mut xx = false;
        let mut ch = false;
        let mut rest = &args[1..];
        while let Some(flag) = rest.first() {
            match flag.to_ascii_uppercase().as_slice() {
                b"NX" => nx = true,
                b"XX" => xx = true,
                b"CH" => ch = true,
                _ => break,
            }
            rest = &rest[1..];
        }
        if nx && xx {
            return Err("ERR XX and NX options at the same time are not compatible".into());
        }
        if rest.is_empty() || rest.len() % 2 != 0 {
            return Err("ERR syntax error".into());
        }
        let mut pairs = Vec::with_capacity(rest.len() / 2);
        for pair in rest.chunks(2) {
            pairs.push((parse_score(&pair[0])?, pair[1].clone()));
        }

        let set = self.sets.entry(key.clone()).or_default();
        let mut added = 0;
        let mut changed = 0;
        for (score, member) in pairs {
            let existing = set.score(&member);
            match existing {
                Some(_) if nx => continue,
                None if xx => continue,
                _ => {}
            }
            if set.insert(score, member) {
                added += 1;
            } else if existing != Some(score) {
                changed += 1;
            }
        }
        if set.is_empty() {
            self.sets.remove(key);
        }
        Ok(Reply::Int(if ch { added + changed } else { added }))
    }

    fn zrange(&self, args: &[Vec<u8>]) -> CommandResult {
        if args.len() < 3 {
            return Err(arity("zrange"));
        }
        let (key, start, stop) = (&args[0], &args[1], &args[2]);
        let opts = RangeOptions::parse(&args[3..], true)?;
        if opts.by_score {
            let min = parse_bound(start)?;
            let max = parse_bound(stop)?;
            return Ok(self.range_by_score(key, min, max, &opts));
        }
        if opts.limit.is_some() {
            return Err(
                "ERR syntax error, LIMIT is only supported in combination with either BYSCORE or BYLEX"
                    .into(),
            );
        }
        let start = parse_int(start)?;
        let stop = parse_int(stop)?;
        let Some(set) = self.sets.get(key) else {
            return Ok(Reply::Array(Vec::new()));
        };
        let len = set.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Reply::Array(Vec::new()));
        }
        let entries = set
            .range_by_score(
                ScoreBound::Inclusive(f64::NEG_INFINITY),
                ScoreBound::Inclusive(f64::INFINITY),
                start as usize,
                Some((stop - start + 1) as usize),
            );
        Ok(entries_reply(entries, opts.with_scores))
    }

    fn zrangebyscore(&self, args: &[Vec<u8>]) -> CommandResult {
        if args.len() < 3 {
            return Err(arity("zrangebyscore"));
        }
        let min = parse_bound(&args[1])?;
        let max = parse_bound(&args[2])?;
        let opts = RangeOptions::parse(&args[3..], false)?;
        Ok(self.range_by_score(&args[0], min, max, &opts))
    }

    fn range_by_score(
        &self,
        key: &[u8],
        min: ScoreBound,
        max: ScoreBound,
        opts: &RangeOptions,
    ) -> Reply {
        let Some(set) = self.sets.get(key) else {
            return Reply::Array(Vec::new());
        };
        let (offset, count) = match opts.limit {
            // A negative offset selects nothing; a negative count means "all".
            Some((offset, _)) if offset < 0 => return Reply::Array(Vec::new()),
            Some((offset, count)) => (offset as usize, usize::try_from(count).ok()),
            None => (0, None),
        };
        entries_reply(
            set.range_by_score(min, max, offset, count),
            opts.with_scores,
        )
    }

    fn zrem(&mut self, args: &[Vec<u8>]) -> CommandResult {
        if args.len() < 2 {
            return Err(arity("zrem"));
        }
        let key = &args[0];
        let Some(set) = self.sets.get_mut(key) else {
            return Ok(Reply::Int(0));
        };
        let removed = args[1..].iter().filter(|member| set.remove(member)).count();
        if set.is_empty() {
            self.sets.remove(key);
        }
        Ok(Reply::Int(removed as i64))
    }

    fn zcard(&self, args: &[Vec<u8>]) -> CommandResult {
        let [key] = args else {
            return Err(arity("zcard"));
        };
        Ok(Reply::Int(self.sets.get(key).map_or(0, |s| s.len() as i64)))
    }

    fn zscore(&self, args: &[Vec<u8>]) -> CommandResult {
        let [key, member] = args else {
            return Err(arity("zscore"));
        };
        Ok(self
            .sets
            .get(key)
            .and_then(|s| s.score(member))
            .map_or(Reply::Nil, |score| Reply::Data(format_score(score).into_bytes())))
    }

    fn del(&mut self, args: &[Vec<u8>]) -> CommandResult {
        if args.is_empty() {
            return Err(arity("del"));
        }
        let removed = args
            .iter()
            .filter(|key| self.sets.remove(key.as_slice()).is_some())
            .count();
        Ok(Reply::Int(removed as i64))
    }
}

#[derive(Debug, Default)]
struct RangeOptions {
    by_score: bool,
    with_scores: bool,
    limit: Option<(i64, i64)>,
}

impl RangeOptions {
    fn parse(args: &[Vec<u8>], allow_by_score: bool) -> std::result::Result<Self, String> {
        let mut opts = RangeOptions::default();
        let mut i = 0;
        while i < args.len() {
            match args[i].to_ascii_uppercase().as_slice() {
                b"BYSCORE" if allow_by_score => opts.by_score = true,
                b"WITHSCORES" => opts.with_scores = true,
                b"LIMIT" if i + 2 < args.len() => {
                    opts.limit = Some((parse_int(&args[i + 1])?, parse_int(&args[i + 2])?));
                    i += 2;
                }
                _ => return Err("ERR syntax error".into()),
            }
            i += 1;
        }
        Ok(opts)
    }
}

fn time(clock: &dyn Clock) -> Reply {
    let now = clock.now();
    Reply::Array(vec![
        Reply::Data(now.as_secs().to_string().into_bytes()),
        Reply::Data(now.subsec_micros().to_string().into_bytes()),
    ])
}

fn entries_reply(entries: Vec<(f64, Vec<u8>)>, with_scores: bool) -> Reply {
    let mut items = Vec::with_capacity(entries.len() * if with_scores { 2 } else { 1 });
    for (score, member) in entries {
        items.push(Reply::Data(member));
        if with_scores {
            items.push(Reply::Data(format_score(score).into_bytes()));
        }
    }
    Reply::Array(items)
}

fn arity(command: &str) -> String {
    format!("ERR wrong number of arguments for '{command}' command")
}

fn parse_int(raw: &[u8]) -> std::result::Result<i64, String> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| "ERR value is not an integer or out of range".to_string())
}

fn parse_score(raw: &[u8]) -> std::result::Result<f64, String> {
    match ScoreBound::parse(raw) {
        Some(ScoreBound::Inclusive(score)) => Ok(score),
        _ => Err("ERR value is not a valid float".into()),
    }
}

fn parse_bound(raw: &[u8]) -> std::result::Result<ScoreBound, String> {
    ScoreBound::parse(raw).ok_or_else(|| "ERR min or max is not a float".to_string())
}

/// Render a number the way Redis renders scores: integral values without a
/// fractional part.
pub fn format_score(score: f64) -> String {
    if score.is_infinite() {
        return if score > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if score.fract() == 0.0 && score.abs() < 9_007_199_254_740_992.0 {
        format!("{}", score as i64)
    } else {
        format!("{score}")
    }
}
