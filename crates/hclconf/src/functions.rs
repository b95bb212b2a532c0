//! functions available to every expression
//!
//! [default_functions] is the starting point of every [crate::Loader]. Additional functions can
//! be registered with [crate::Loader::functions]; a function with the same name replaces the
//! default.
use chrono::{DateTime, Local, Offset, SecondsFormat, TimeZone, Utc};
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::{Map, Number, Value};
use indexmap::IndexMap;
use std::fmt::{Display, Write};

/// Function namespace: name -> definition
pub type Functions = IndexMap<String, FuncDef>;

pub fn default_functions() -> Functions {
    let string = || ParamType::String;
    let number = || ParamType::Number;

    [
        ("abs", FuncDef::builder().param(number()).build(abs)),
        ("duration", FuncDef::builder().param(string()).build(duration)),
        (
            "coalesce",
            FuncDef::builder().variadic_param(ParamType::Any).build(coalesce),
        ),
        (
            "env",
            FuncDef::builder()
                .param(string())
                .variadic_param(ParamType::nullable(string()))
                .build(env),
        ),
        (
            "join",
            FuncDef::builder()
                .param(string())
                .variadic_param(ParamType::array_of(ParamType::Any))
                .build(join),
        ),
        (
            "jsondecode",
            FuncDef::builder().param(string()).build(jsondecode),
        ),
        (
            "jsonencode",
            FuncDef::builder().param(ParamType::Any).build(jsonencode),
        ),
        (
            "keys",
            FuncDef::builder()
                .param(ParamType::object_of(ParamType::Any))
                .build(keys),
        ),
        (
            "length",
            FuncDef::builder()
                .param(ParamType::one_of([
                    string(),
                    ParamType::array_of(ParamType::Any),
                    ParamType::object_of(ParamType::Any),
                ]))
                .build(length),
        ),
        ("lower", FuncDef::builder().param(string()).build(lower)),
        ("max", FuncDef::builder().variadic_param(number()).build(max)),
        (
            "merge",
            FuncDef::builder()
                .variadic_param(ParamType::nullable(ParamType::object_of(ParamType::Any)))
                .build(merge),
        ),
        ("min", FuncDef::builder().variadic_param(number()).build(min)),
        ("must_env", FuncDef::builder().param(string()).build(must_env)),
        ("now", FuncDef::builder().build(now)),
        (
            "split",
            FuncDef::builder().param(string()).param(string()).build(split),
        ),
        (
            "strftime",
            FuncDef::builder()
                .param(string())
                .param(ParamType::nullable(number()))
                .build(strftime),
        ),
        (
            "strftime_in_zone",
            FuncDef::builder()
                .param(string())
                .param(string())
                .param(ParamType::nullable(number()))
                .build(strftime_in_zone),
        ),
        (
            "trimprefix",
            FuncDef::builder()
                .param(string())
                .param(string())
                .build(trimprefix),
        ),
        (
            "trimspace",
            FuncDef::builder().param(string()).build(trimspace),
        ),
        (
            "trimsuffix",
            FuncDef::builder()
                .param(string())
                .param(string())
                .build(trimsuffix),
        ),
        ("upper", FuncDef::builder().param(string()).build(upper)),
        (
            "values",
            FuncDef::builder()
                .param(ParamType::object_of(ParamType::Any))
                .build(values),
        ),
        (
            "yamldecode",
            FuncDef::builder().param(string()).build(yamldecode),
        ),
        (
            "yamlencode",
            FuncDef::builder().param(ParamType::Any).build(yamlencode),
        ),
    ]
    .into_iter()
    .map(|(name, func)| (name.to_string(), func))
    .collect()
}

fn str_arg(args: &FuncArgs, index: usize) -> Result<&str, String> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {index} must be a string"))
}

fn object_arg(args: &FuncArgs, index: usize) -> Result<&Map<String, Value>, String> {
    args.get(index)
        .and_then(Value::as_object)
        .ok_or_else(|| format!("argument {index} must be an object"))
}

fn number_arg(value: &Value) -> Result<&Number, String> {
    value
        .as_number()
        .ok_or_else(|| format!("`{value}` is not a number"))
}

/// string representation of primitive values
fn to_plain_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("`{other}` can not be converted to a string")),
    }
}

fn env(args: FuncArgs) -> Result<Value, String> {
    let key = str_arg(&args, 0)?;
    if let Some(value) = std::env::var(key).ok().filter(|value| !value.is_empty()) {
        return Ok(Value::String(value));
    }

    match args.get(1) {
        Some(Value::String(default)) => Ok(Value::String(default.clone())),
        _ => Ok(Value::String(String::new())),
    }
}

fn must_env(args: FuncArgs) -> Result<Value, String> {
    let key = str_arg(&args, 0)?;
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => Ok(Value::String(value)),
        _ => Err(format!("env `{key}` is not set")),
    }
}

fn upper(args: FuncArgs) -> Result<Value, String> {
    Ok(str_arg(&args, 0)?.to_uppercase().into())
}

fn lower(args: FuncArgs) -> Result<Value, String> {
    Ok(str_arg(&args, 0)?.to_lowercase().into())
}

fn trimspace(args: FuncArgs) -> Result<Value, String> {
    Ok(str_arg(&args, 0)?.trim().into())
}

fn trimprefix(args: FuncArgs) -> Result<Value, String> {
    let s = str_arg(&args, 0)?;
    let prefix = str_arg(&args, 1)?;
    Ok(s.strip_prefix(prefix).unwrap_or(s).into())
}

fn trimsuffix(args: FuncArgs) -> Result<Value, String> {
    let s = str_arg(&args, 0)?;
    let suffix = str_arg(&args, 1)?;
    Ok(s.strip_suffix(suffix).unwrap_or(s).into())
}

fn join(args: FuncArgs) -> Result<Value, String> {
    let separator = str_arg(&args, 0)?;

    let mut elements = vec![];
    for list in args.iter().skip(1) {
        for element in list.as_array().into_iter().flatten() {
            elements.push(to_plain_string(element)?);
        }
    }

    Ok(elements.join(separator).into())
}

fn split(args: FuncArgs) -> Result<Value, String> {
    let separator = str_arg(&args, 0)?;
    let s = str_arg(&args, 1)?;

    Ok(Value::Array(
        s.split(separator).map(|part| part.into()).collect(),
    ))
}

fn coalesce(args: FuncArgs) -> Result<Value, String> {
    args.iter()
        .find(|value| !value.is_null() && value.as_str() != Some(""))
        .cloned()
        .ok_or_else(|| "no non-null, non-empty-string arguments".to_string())
}

fn length(args: FuncArgs) -> Result<Value, String> {
    let length = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(array) => array.len(),
        Value::Object(object) => object.len(),
        other => return Err(format!("`{other}` has no length")),
    };

    Ok(length.into())
}

fn keys(args: FuncArgs) -> Result<Value, String> {
    let mut keys: Vec<&String> = object_arg(&args, 0)?.keys().collect();
    keys.sort();
    Ok(Value::Array(
        keys.into_iter().map(|key| key.clone().into()).collect(),
    ))
}

fn values(args: FuncArgs) -> Result<Value, String> {
    let mut entries: Vec<(&String, &Value)> = object_arg(&args, 0)?.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(Value::Array(
        entries.into_iter().map(|(_, value)| value.clone()).collect(),
    ))
}

fn merge(args: FuncArgs) -> Result<Value, String> {
    let mut merged = Map::new();
    for object in args.iter().filter_map(Value::as_object) {
        for (key, value) in object {
            merged.insert(key.clone(), value.clone());
        }
    }
    Ok(Value::Object(merged))
}

fn abs(args: FuncArgs) -> Result<Value, String> {
    let number = number_arg(&args[0])?;

    if let Some(int) = number.as_i64() {
        return int
            .checked_abs()
            .map(Value::from)
            .ok_or_else(|| format!("`{int}` has no absolute value within range"));
    }

    Ok(number.as_f64().map_or(Value::Null, |float| float.abs().into()))
}

fn extremum(args: FuncArgs, pick_greater: bool) -> Result<Value, String> {
    let mut best: Option<&Number> = None;

    for value in args.iter() {
        let number = number_arg(value)?;
        best = match best {
            None => Some(number),
            Some(current) => {
                let (Some(a), Some(b)) = (number.as_f64(), current.as_f64()) else {
                    return Err("numbers must be comparable".to_string());
                };
                if (a > b) == pick_greater && a != b {
                    Some(number)
                } else {
                    Some(current)
                }
            }
        };
    }

    best.cloned()
        .map(Value::Number)
        .ok_or_else(|| "must pass at least one number".to_string())
}

fn max(args: FuncArgs) -> Result<Value, String> {
    extremum(args, true)
}

fn min(args: FuncArgs) -> Result<Value, String> {
    extremum(args, false)
}

fn jsonencode(args: FuncArgs) -> Result<Value, String> {
    serde_json::to_string(&args[0])
        .map(Value::String)
        .map_err(|err| err.to_string())
}

fn jsondecode(args: FuncArgs) -> Result<Value, String> {
    serde_json::from_str(str_arg(&args, 0)?).map_err(|err| err.to_string())
}

fn yamlencode(args: FuncArgs) -> Result<Value, String> {
    serde_yaml::to_string(&args[0])
        .map(Value::String)
        .map_err(|err| err.to_string())
}

fn yamldecode(args: FuncArgs) -> Result<Value, String> {
    serde_yaml::from_str(str_arg(&args, 0)?).map_err(|err| err.to_string())
}

fn now(_: FuncArgs) -> Result<Value, String> {
    Ok(unix_seconds(&Utc::now()).into())
}

fn unix_seconds(time: &DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) / 1e9
}

/// `d` as seconds, `d` is a sequence of decimal numbers with a unit: `1h30m`, `1.5s`, `-300ms`
fn duration(args: FuncArgs) -> Result<Value, String> {
    let src = str_arg(&args, 0)?;
    parse_duration(src)
        .map(Value::from)
        .ok_or_else(|| format!("invalid duration {src:?}"))
}

fn parse_duration(src: &str) -> Option<f64> {
    let (sign, mut rest) = match src.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, src.strip_prefix('+').unwrap_or(src)),
    };
    if rest == "0" {
        return Some(0.0);
    }
    if rest.is_empty() {
        return None;
    }

    let mut seconds = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return None;
        }
        let number: f64 = number.parse().ok()?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1e-9,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };

        seconds += number * scale;
        rest = tail;
    }

    Some(sign * seconds)
}

/// The time given as unix seconds, now if null
fn time_arg(value: &Value) -> Result<DateTime<Utc>, String> {
    if value.is_null() {
        return Ok(Utc::now());
    }

    let seconds = number_arg(value)?
        .as_f64()
        .ok_or_else(|| format!("`{value}` is not a time"))?;
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;

    DateTime::from_timestamp(whole as i64, nanos)
        .ok_or_else(|| format!("`{value}` is out of the range of a time"))
}

fn strftime(args: FuncArgs) -> Result<Value, String> {
    let layout = str_arg(&args, 0)?;
    let time = time_arg(&args[1])?;
    format_time(layout, &time.with_timezone(&Local)).map(Value::String)
}

fn strftime_in_zone(args: FuncArgs) -> Result<Value, String> {
    let layout = str_arg(&args, 0)?;
    let zone = str_arg(&args, 1)?;
    let time = time_arg(&args[2])?;

    if zone == "Local" {
        return format_time(layout, &time.with_timezone(&Local)).map(Value::String);
    }

    let zone: chrono_tz::Tz = match zone {
        "" => chrono_tz::UTC,
        zone => zone
            .parse()
            .map_err(|err| format!("unknown time zone {zone:?}: {err}"))?,
    };
    format_time(layout, &time.with_timezone(&zone)).map(Value::String)
}

/// Format with a `%` strftime layout, `rfc3399` for RFC 3339 or a reference time layout
/// such as `2006-01-02T15:04:05Z07:00`
fn format_time<Tz>(layout: &str, time: &DateTime<Tz>) -> Result<String, String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if layout.contains('%') {
        return render(time, layout);
    }

    if layout.eq_ignore_ascii_case("rfc3399") {
        return Ok(time.to_rfc3339_opts(SecondsFormat::Secs, true));
    }

    render(time, &reference_layout(layout, time))
}

fn render<Tz>(time: &DateTime<Tz>, format: &str) -> Result<String, String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut rendered = String::new();
    write!(rendered, "{}", time.format(format))
        .map_err(|_| format!("invalid time layout {format:?}"))?;
    Ok(rendered)
}

/// Reference time tokens and their strftime equivalent, longest first where they share a prefix
const REFERENCE_TOKENS: &[(&str, &str)] = &[
    ("January", "%B"),
    ("Jan", "%b"),
    ("Monday", "%A"),
    ("Mon", "%a"),
    ("MST", "%Z"),
    ("2006", "%Y"),
    ("_2", "%e"),
    ("15", "%H"),
    ("01", "%m"),
    ("02", "%d"),
    ("03", "%I"),
    ("04", "%M"),
    ("05", "%S"),
    ("06", "%y"),
    ("002", "%j"),
    ("-07:00", "%:z"),
    ("-0700", "%z"),
    ("PM", "%p"),
    ("pm", "%P"),
    ("1", "%-m"),
    ("2", "%-d"),
    ("3", "%-I"),
    ("4", "%-M"),
    ("5", "%-S"),
];

/// Translate a reference time layout into a strftime format
fn reference_layout<Tz: TimeZone>(layout: &str, time: &DateTime<Tz>) -> String {
    let utc = time.offset().fix().local_minus_utc() == 0;

    let mut format = String::new();
    let mut rest = layout;
    while let Some(c) = rest.chars().next() {
        if let Some(zulu) = ["Z07:00", "Z0700"].iter().find(|zulu| rest.starts_with(**zulu)) {
            format.push_str(match (utc, *zulu) {
                (true, _) => "Z",
                (false, "Z07:00") => "%:z",
                (false, _) => "%z",
            });
            rest = &rest[zulu.len()..];
            continue;
        }

        if let Some((digits, consumed)) = fraction(rest, time.timestamp_subsec_nanos()) {
            format.push_str(&digits);
            rest = &rest[consumed..];
            continue;
        }

        // longest token wins: "2006" over "2", "January" over "Jan"
        let token = REFERENCE_TOKENS
            .iter()
            .filter(|(token, _)| rest.starts_with(token))
            .max_by_key(|(token, _)| token.len());
        match token {
            Some((token, strftime)) => {
                format.push_str(strftime);
                rest = &rest[token.len()..];
            }
            None => {
                format.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }

    format
}

/// `.000` is a fixed number of fraction digits, `.999` drops trailing zeros
fn fraction(rest: &str, nanos: u32) -> Option<(String, usize)> {
    let mut chars = rest.chars();
    let separator = chars.next().filter(|c| *c == '.' || *c == ',')?;
    let digit = chars.next().filter(|c| *c == '0' || *c == '9')?;

    let width = rest[1..].chars().take_while(|c| *c == digit).count();
    let consumed = 1 + width;
    if rest[consumed..].starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let all = format!("{nanos:09}");
    let digits = &all[..width.min(9)];
    let rendered = if digit == '0' {
        format!("{separator}{digits}")
    } else {
        let trimmed = digits.trim_end_matches('0');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{separator}{trimmed}")
        }
    };

    Some((rendered, consumed))
}
