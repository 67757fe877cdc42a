//! `aspectflow demos|run|inspect` — Evaluate the built-in demo graphs.

use aspectflow_config::AppConfig;
use aspectflow_core::{Overrides, ResultCache, Value, with_cache_scope};
use aspectflow_ops::demos::{self, Demo};

pub fn list() -> Result<(), Box<dyn std::error::Error>> {
    println!("📦 Demo graphs:");
    println!();
    for demo in demos::all() {
        println!("   {:<20} {}", demo.name, demo.description);
        if !demo.try_with.is_empty() {
            println!("   {:<20} try: --set {}", "", demo.try_with.join(" | --set "));
        }
    }
    Ok(())
}

pub fn run(
    config: &AppConfig,
    name: &str,
    set: &[String],
    preset: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let demo = find(name)?;
    let overrides = collect_overrides(config, set, preset)?;
    let node = demo.build()?;

    // With the cache disabled the run happens inside a scope that clears it.
    let scope = (!config.cache.enabled).then(with_cache_scope);
    let result = node.call_with(overrides, &config.eval_options());
    let stats = ResultCache::global().stats();
    drop(scope);
    let value = result?;

    tracing::debug!(demo = demo.name, hits = stats.hits, misses = stats.misses, "Run finished");

    if json {
        let report = serde_json::json!({
            "demo": demo.name,
            "result": value,
            "cache": stats,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} = {value}", demo.name);
    }
    Ok(())
}

pub fn inspect(
    config: &AppConfig,
    name: &str,
    set: &[String],
    preset: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let demo = find(name)?;
    let overrides = collect_overrides(config, set, preset)?;
    let snapshot = demo.build()?.input_context(overrides)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn find(name: &str) -> Result<&'static Demo, String> {
    demos::find(name).ok_or_else(|| {
        let known: Vec<&str> = demos::all().iter().map(|d| d.name).collect();
        format!("Unknown demo '{name}'. Available: {}", known.join(", "))
    })
}

/// Preset values first, then `--set` pairs on top.
fn collect_overrides(
    config: &AppConfig,
    set: &[String],
    preset: Option<&str>,
) -> Result<Overrides, Box<dyn std::error::Error>> {
    let mut overrides = match preset {
        Some(name) => config
            .preset(name)
            .ok_or_else(|| format!("Unknown preset '{name}'"))?
            .overrides()?,
        None => Overrides::new(),
    };
    for pair in set {
        let (name, value) = parse_assignment(pair)?;
        overrides.insert(name, value);
    }
    Ok(overrides)
}

/// Parse `name=value`.
pub fn parse_assignment(pair: &str) -> Result<(String, Value), String> {
    let (name, raw) = pair
        .split_once('=')
        .ok_or_else(|| format!("Expected NAME=VALUE, got '{pair}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Missing name in '{pair}'"));
    }
    Ok((name.to_string(), parse_value(raw.trim())?))
}

/// Parse a value as JSON when possible, otherwise take it as a bare string.
pub fn parse_value(raw: &str) -> Result<Value, String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => json_to_value(&json),
        Err(_) => Ok(Value::str(raw)),
    }
}

fn json_to_value(json: &serde_json::Value) -> Result<Value, String> {
    match json {
        serde_json::Value::Null => Ok(Value::null()),
        serde_json::Value::Bool(b) => Ok(Value::bool(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::int(i)),
            None => n
                .as_f64()
                .map(Value::float)
                .ok_or_else(|| format!("Unsupported number {n}")),
        },
        serde_json::Value::String(s) => Ok(Value::str(s.as_str())),
        serde_json::Value::Array(items) => items
            .iter()
            .map(json_to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::list),
        serde_json::Value::Object(_) => Err("Objects cannot be used as aspect values".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars_lists_and_bare_strings() {
        assert_eq!(parse_value("3").unwrap().as_i64(), Some(3));
        assert_eq!(parse_value("2.5").unwrap().as_f64(), Some(2.5));
        assert_eq!(parse_value("true").unwrap().as_bool(), Some(true));
        assert!(parse_value("null").unwrap().is_null());
        assert_eq!(parse_value("kl").unwrap().as_str(), Some("kl"));
        assert_eq!(parse_value("\"L1\"").unwrap().as_str(), Some("L1"));
        assert_eq!(parse_value("[1, 2.0]").unwrap().as_list().unwrap().len(), 2);
        assert!(parse_value("{\"a\": 1}").is_err());
    }

    #[test]
    fn parses_assignments() {
        let (name, value) = parse_assignment("scale = 3").unwrap();
        assert_eq!(name, "scale");
        assert_eq!(value.as_i64(), Some(3));
        assert!(parse_assignment("scale").is_err());
        assert!(parse_assignment("=3").is_err());
    }

    #[test]
    fn set_pairs_override_presets() {
        let config: AppConfig = toml::from_str(
            r#"
[[defaults]]
name = "wide"
values = { scale = 3, bias = 1 }
"#,
        )
        .unwrap();
        let overrides =
            collect_overrides(&config, &["scale=5".to_string()], Some("wide")).unwrap();
        assert_eq!(overrides.get("scale").unwrap().as_i64(), Some(5));
        assert_eq!(overrides.get("bias").unwrap().as_i64(), Some(1));
        assert!(collect_overrides(&config, &[], Some("narrow")).is_err());
    }

    #[test]
    fn unknown_demo_lists_alternatives() {
        let err = find("nope").err().unwrap();
        assert!(err.contains("quickstart"));
    }
}
