//! Standard function library.
//!
//! Comparisons are filters. Math and string functions produce a value and
//! drop the row when their arguments have the wrong type or the result is
//! not a finite number.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::value::RawValue;

use super::function::{Arity, FunctionInfo, FunctionRegistry};

/// Name of the entity-id generator used for records created by blocks.
pub const GEN_ID: &str = "internal/gen-id";

const REGEX_CACHE_MAX: usize = 256;

// Shared by every program in the process. Entries are compiled patterns
// only, so nothing a program observes depends on another program.
static REGEX_CACHE: OnceLock<RwLock<HashMap<String, regex::Regex>>> = OnceLock::new();

fn cached_regex(pattern: &str) -> Option<regex::Regex> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Ok(guard) = cache.read() {
        if let Some(re) = guard.get(pattern) {
            return Some(re.clone());
        }
    }

    let compiled = regex::Regex::new(pattern).ok()?;

    if let Ok(mut guard) = cache.write() {
        if guard.len() >= REGEX_CACHE_MAX {
            guard.clear();
        }
        guard
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }

    Some(compiled)
}

fn numbers<const N: usize>(args: &[RawValue]) -> Option<[f64; N]> {
    let mut out = [0.0; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg.as_number()?;
    }
    (args.len() == N).then_some(out)
}

fn finite(n: f64) -> Option<RawValue> {
    n.is_finite().then(|| RawValue::from(n))
}

fn ordered(args: &[RawValue], keep: fn(std::cmp::Ordering) -> bool) -> bool {
    match (&args[0], &args[1]) {
        (RawValue::Number(a), RawValue::Number(b)) => a.partial_cmp(b).is_some_and(keep),
        (RawValue::String(a), RawValue::String(b)) => keep(a.cmp(b)),
        _ => false,
    }
}

fn text(value: &RawValue) -> String {
    value.to_string()
}

fn gen_id(args: &[RawValue]) -> Option<RawValue> {
    let mut hasher = blake3::Hasher::new();
    for arg in args {
        match arg {
            RawValue::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                hasher.update(&[0]);
                hasher.update(&n.to_bits().to_le_bytes());
            }
            RawValue::String(s) => {
                hasher.update(&[1]);
                hasher.update(&(s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
        }
    }
    let hex = hasher.finalize().to_hex();
    Some(RawValue::from(format!("⦑{}⦒", &hex[..32])))
}

/// Install every standard function into `registry`.
pub fn install(registry: &mut FunctionRegistry) {
    use std::cmp::Ordering;

    registry
        .register(FunctionInfo::filter("compare/>", Arity::Fixed(2), |args| {
            ordered(args, |o| o == Ordering::Greater)
        }))
        .register(FunctionInfo::filter("compare/>=", Arity::Fixed(2), |args| {
            ordered(args, |o| o != Ordering::Less)
        }))
        .register(FunctionInfo::filter("compare/<", Arity::Fixed(2), |args| {
            ordered(args, |o| o == Ordering::Less)
        }))
        .register(FunctionInfo::filter("compare/<=", Arity::Fixed(2), |args| {
            ordered(args, |o| o != Ordering::Greater)
        }))
        .register(FunctionInfo::filter("compare/!=", Arity::Fixed(2), |args| {
            args[0] != args[1]
        }))
        .register(FunctionInfo::filter("compare/==", Arity::Fixed(2), |args| {
            args[0] == args[1]
        }));

    registry
        .register(FunctionInfo::map("math/+", Arity::Fixed(2), |args| {
            numbers::<2>(args).and_then(|[a, b]| finite(a + b))
        }))
        .register(FunctionInfo::map("math/-", Arity::Fixed(2), |args| {
            numbers::<2>(args).and_then(|[a, b]| finite(a - b))
        }))
        .register(FunctionInfo::map("math/*", Arity::Fixed(2), |args| {
            numbers::<2>(args).and_then(|[a, b]| finite(a * b))
        }))
        .register(FunctionInfo::map("math//", Arity::Fixed(2), |args| {
            numbers::<2>(args).and_then(|[a, b]| finite(a / b))
        }))
        .register(FunctionInfo::map("math/floor", Arity::Fixed(1), |args| {
            numbers::<1>(args).and_then(|[a]| finite(a.floor()))
        }))
        .register(FunctionInfo::map("math/ceil", Arity::Fixed(1), |args| {
            numbers::<1>(args).and_then(|[a]| finite(a.ceil()))
        }))
        .register(FunctionInfo::map("math/round", Arity::Fixed(1), |args| {
            numbers::<1>(args).and_then(|[a]| finite(a.round()))
        }))
        .register(FunctionInfo::map("math/sin", Arity::Fixed(1), |args| {
            numbers::<1>(args).and_then(|[a]| finite(a.to_radians().sin()))
        }))
        .register(FunctionInfo::map("math/cos", Arity::Fixed(1), |args| {
            numbers::<1>(args).and_then(|[a]| finite(a.to_radians().cos()))
        }))
        .register(FunctionInfo::map("math/tan", Arity::Fixed(1), |args| {
            numbers::<1>(args).and_then(|[a]| finite(a.to_radians().tan()))
        }))
        .register(FunctionInfo::map("math/max", Arity::Fixed(2), |args| {
            numbers::<2>(args).and_then(|[a, b]| finite(a.max(b)))
        }))
        .register(FunctionInfo::map("math/min", Arity::Fixed(2), |args| {
            numbers::<2>(args).and_then(|[a, b]| finite(a.min(b)))
        }))
        .register(FunctionInfo::map("math/mod", Arity::Fixed(2), |args| {
            numbers::<2>(args).and_then(|[a, b]| finite(a % b))
        }))
        .register(FunctionInfo::map("math/abs", Arity::Fixed(1), |args| {
            numbers::<1>(args).and_then(|[a]| finite(a.abs()))
        }))
        .register(FunctionInfo::map("math/to-fixed", Arity::Fixed(2), |args| {
            let [a, digits] = numbers::<2>(args)?;
            if !(0.0..=100.0).contains(&digits) {
                return None;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let digits = digits as usize;
            Some(RawValue::from(format!("{a:.digits$}")))
        }));

    registry
        .register(FunctionInfo::map("string/concat", Arity::Variadic, |args| {
            Some(RawValue::from(args.iter().map(text).collect::<String>()))
        }))
        .register(FunctionInfo::map("string/replace", Arity::Fixed(3), |args| {
            let (source, from, to) = (text(&args[0]), text(&args[1]), text(&args[2]));
            Some(RawValue::from(source.replace(&from, &to)))
        }))
        .register(FunctionInfo::map("string/get", Arity::Fixed(2), |args| {
            let at = args[1].as_number()?;
            if at < 1.0 || at.fract() != 0.0 {
                return None;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let at = at as usize;
            text(&args[0])
                .chars()
                .nth(at - 1)
                .map(|c| RawValue::from(c.to_string()))
        }))
        .register(FunctionInfo::map("string/uppercase", Arity::Fixed(1), |args| {
            Some(RawValue::from(text(&args[0]).to_uppercase()))
        }))
        .register(FunctionInfo::map("string/lowercase", Arity::Fixed(1), |args| {
            Some(RawValue::from(text(&args[0]).to_lowercase()))
        }))
        .register(FunctionInfo::map("string/index-of", Arity::Fixed(2), |args| {
            let haystack = text(&args[0]);
            let byte = haystack.find(&text(&args[1]))?;
            Some(RawValue::from(haystack[..byte].chars().count()))
        }))
        .register(FunctionInfo::map("string/length", Arity::Fixed(1), |args| {
            Some(RawValue::from(text(&args[0]).chars().count()))
        }))
        .register(FunctionInfo::filter("string/matches", Arity::Fixed(2), |args| {
            let Some(pattern) = args[1].as_str() else {
                return false;
            };
            cached_regex(pattern).is_some_and(|re| re.is_match(&text(&args[0])))
        }));

    registry.register(FunctionInfo::map(GEN_ID, Arity::Variadic, gen_id));
}
