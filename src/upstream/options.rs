use super::Options;
use crate::config::UpstreamConfig;
use serde_json::Value;

/// Server-side values filled into every generate/chat `options` map.
///
/// The overlay is fill-if-absent: a caller value always wins, including `0`.
/// A key sent as JSON `null` is treated as absent.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDefaults {
    pub num_predict: u64,
    pub keep_alive: String,
}

impl OptionDefaults {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            num_predict: config.num_predict,
            keep_alive: config.keep_alive.clone(),
        }
    }

    pub fn apply(&self, mut options: Options) -> Options {
        fill_if_absent(&mut options, "num_predict", Value::from(self.num_predict));
        fill_if_absent(&mut options, "keep_alive", Value::from(self.keep_alive.as_str()));
        options
    }
}

impl Default for OptionDefaults {
    fn default() -> Self {
        Self::from_config(&UpstreamConfig::default())
    }
}

fn fill_if_absent(options: &mut Options, key: &str, value: Value) {
    let present = options.get(key).is_some_and(|v| !v.is_null());
    if !present {
        options.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn options(value: Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_fills_missing_keys() {
        let applied = OptionDefaults::default().apply(Options::new());
        assert_eq!(Value::Object(applied), json!({"num_predict": 512, "keep_alive": "5m"}));
    }

    #[test]
    fn test_caller_values_win() {
        let applied = OptionDefaults::default()
            .apply(options(json!({"num_predict": 64, "keep_alive": "1h", "temperature": 0.2})));

        assert_eq!(
            Value::Object(applied),
            json!({"num_predict": 64, "keep_alive": "1h", "temperature": 0.2})
        );
    }

    #[test]
    fn test_zero_is_kept() {
        let applied = OptionDefaults::default().apply(options(json!({"num_predict": 0})));
        assert_eq!(applied["num_predict"], json!(0));
    }

    #[test]
    fn test_null_is_replaced() {
        let applied = OptionDefaults::default().apply(options(json!({"num_predict": null})));
        assert_eq!(applied["num_predict"], json!(512));
    }

    #[test]
    fn test_configured_keep_alive() {
        let defaults = OptionDefaults {
            num_predict: 512,
            keep_alive: "30m".to_string(),
        };
        assert_eq!(defaults.apply(Options::new())["keep_alive"], json!("30m"));
    }
}
