//! Animation longhand values and `animation` shorthand expansion.

/// Resolved animation longhands of one element, serialized as comma-separated
/// lists the way CSSOM computed style reports them. All four lists have the
/// same number of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedAnimation {
    pub animation_name: String,
    pub animation_duration: String,
    pub animation_delay: String,
    pub animation_iteration_count: String,
}

impl Default for ComputedAnimation {
    fn default() -> Self {
        Self {
            animation_name: "none".to_string(),
            animation_duration: "0s".to_string(),
            animation_delay: "0s".to_string(),
            animation_iteration_count: "1".to_string(),
        }
    }
}

impl ComputedAnimation {
    /// Build from raw lists, leaving the iteration count at its initial value.
    pub fn new(
        names: impl Into<String>,
        durations: impl Into<String>,
        delays: impl Into<String>,
    ) -> Self {
        Self {
            animation_name: names.into(),
            animation_duration: durations.into(),
            animation_delay: delays.into(),
            ..Self::default()
        }
    }

    pub fn with_iteration_count(mut self, counts: impl Into<String>) -> Self {
        self.animation_iteration_count = counts.into();
        self
    }

    pub fn names(&self) -> Vec<&str> {
        split_list(&self.animation_name)
    }

    pub fn durations(&self) -> Vec<&str> {
        split_list(&self.animation_duration)
    }

    pub fn delays(&self) -> Vec<&str> {
        split_list(&self.animation_delay)
    }

    pub fn iteration_counts(&self) -> Vec<&str> {
        split_list(&self.animation_iteration_count)
    }
}

/// Convert a CSS `<time>` token (`200ms`, `0.2s`, `.5s`) to milliseconds.
/// Returns `None` for anything that is not a finite time value.
pub fn parse_time_ms(token: &str) -> Option<f64> {
    let token = token.trim().to_ascii_lowercase();
    let (number, scale) = match token.strip_suffix("ms") {
        Some(number) => (number, 1.0),
        None => (token.strip_suffix('s')?, 1000.0),
    };
    let value: f64 = number.trim().parse().ok()?;
    value.is_finite().then_some(value * scale)
}

/// Split a top-level comma list, leaving commas inside parentheses alone.
pub(crate) fn split_list(value: &str) -> Vec<&str> {
    split_top_level(value, |c| c == ',')
        .into_iter()
        .map(str::trim)
        .collect()
}

fn split_top_level(value: &str, is_separator: impl Fn(char) -> bool) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in value.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if depth == 0 && is_separator(c) => {
                out.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&value[start..]);
    out
}

/// Longhand values collected during the cascade. `None` means "initial".
#[derive(Debug, Clone, Default)]
pub(crate) struct AnimationLonghands {
    pub(crate) names: Option<Vec<String>>,
    pub(crate) durations: Option<Vec<String>>,
    pub(crate) delays: Option<Vec<String>>,
    pub(crate) iteration_counts: Option<Vec<String>>,
}

impl AnimationLonghands {
    /// Apply one declaration. Returns false for properties outside the
    /// animation family.
    pub(crate) fn apply(&mut self, name: &str, value: &str) -> bool {
        let reset = matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "initial" | "inherit" | "unset" | "revert"
        );
        let list = || -> Option<Vec<String>> {
            (!reset).then(|| split_list(value).into_iter().map(str::to_string).collect())
        };
        match name {
            "animation" => {
                if reset {
                    *self = Self::default();
                } else {
                    self.apply_shorthand(value);
                }
            }
            "animation-name" => self.names = list(),
            "animation-duration" => self.durations = list(),
            "animation-delay" => self.delays = list(),
            "animation-iteration-count" => self.iteration_counts = list(),
            _ => return false,
        }
        true
    }

    fn apply_shorthand(&mut self, value: &str) {
        let mut names = Vec::new();
        let mut durations = Vec::new();
        let mut delays = Vec::new();
        let mut counts = Vec::new();
        for layer in split_list(value) {
            let parsed = ShorthandLayer::parse(layer);
            names.push(parsed.name);
            durations.push(parsed.duration);
            delays.push(parsed.delay);
            counts.push(parsed.iteration_count);
        }
        self.names = Some(names);
        self.durations = Some(durations);
        self.delays = Some(delays);
        self.iteration_counts = Some(counts);
    }

    /// Finish the cascade: fill initial values and repeat the shorter lists
    /// to the length of the name list.
    pub(crate) fn compute(self) -> ComputedAnimation {
        let names = self.names.unwrap_or_else(|| vec!["none".to_string()]);
        let len = names.len().max(1);
        let durations = repeat_to(self.durations, len, "0s");
        let delays = repeat_to(self.delays, len, "0s");
        let counts = repeat_to(self.iteration_counts, len, "1");
        ComputedAnimation {
            animation_name: names.join(", "),
            animation_duration: durations.join(", "),
            animation_delay: delays.join(", "),
            animation_iteration_count: counts.join(", "),
        }
    }
}

fn repeat_to(values: Option<Vec<String>>, len: usize, initial: &str) -> Vec<String> {
    let values = values
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| vec![initial.to_string()]);
    values.iter().cycle().take(len).cloned().collect()
}

struct ShorthandLayer {
    name: String,
    duration: String,
    delay: String,
    iteration_count: String,
}

const SHORTHAND_KEYWORDS: &[&str] = &[
    // timing functions
    "linear",
    "ease",
    "ease-in",
    "ease-out",
    "ease-in-out",
    "step-start",
    "step-end",
    // direction
    "normal",
    "reverse",
    "alternate",
    "alternate-reverse",
    // fill mode
    "none",
    "forwards",
    "backwards",
    "both",
    // play state
    "running",
    "paused",
];

impl ShorthandLayer {
    fn parse(layer: &str) -> Self {
        let mut out = Self {
            name: "none".to_string(),
            duration: "0s".to_string(),
            delay: "0s".to_string(),
            iteration_count: "1".to_string(),
        };
        let mut times = 0;
        let mut named = false;
        for token in split_top_level(layer, char::is_whitespace) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let lower = token.to_ascii_lowercase();
            if parse_time_ms(&lower).is_some() {
                match times {
                    0 => out.duration = token.to_string(),
                    1 => out.delay = token.to_string(),
                    _ => {}
                }
                times += 1;
            } else if lower == "infinite" || lower.parse::<f64>().is_ok() {
                out.iteration_count = token.to_string();
            } else if token.contains('(') || SHORTHAND_KEYWORDS.contains(&lower.as_str()) {
                continue;
            } else if !named {
                out.name = token.trim_matches(|c| c == '"' || c == '\'').to_string();
                named = true;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_tokens() {
        assert_eq!(parse_time_ms("200ms"), Some(200.0));
        assert_eq!(parse_time_ms("0.3s"), Some(300.0));
        assert_eq!(parse_time_ms(".5S"), Some(500.0));
        assert_eq!(parse_time_ms(" 0s "), Some(0.0));
        assert_eq!(parse_time_ms("-100ms"), Some(-100.0));
        assert_eq!(parse_time_ms("200"), None);
        assert_eq!(parse_time_ms("fast"), None);
        assert_eq!(parse_time_ms("infs"), None);
        assert_eq!(parse_time_ms(""), None);
    }

    #[test]
    fn list_split_respects_parentheses() {
        assert_eq!(
            split_list("a 1s cubic-bezier(0, 0, 1, 1), b 2s"),
            vec!["a 1s cubic-bezier(0, 0, 1, 1)", "b 2s"]
        );
    }

    #[test]
    fn shorthand_layer_classifies_tokens() {
        let layer = ShorthandLayer::parse("2s steps(4, end) 500ms 3 reverse spin");
        assert_eq!(layer.name, "spin");
        assert_eq!(layer.duration, "2s");
        assert_eq!(layer.delay, "500ms");
        assert_eq!(layer.iteration_count, "3");

        let none = ShorthandLayer::parse("none");
        assert_eq!(none.name, "none");
        assert_eq!(none.duration, "0s");
    }

    #[test]
    fn reset_keywords_restore_initial() {
        let mut longhands = AnimationLonghands::default();
        longhands.apply("animation-name", "fade");
        longhands.apply("animation-duration", "1s");
        longhands.apply("animation-name", "initial");
        let computed = longhands.compute();
        assert_eq!(computed.animation_name, "none");
        assert_eq!(computed.animation_duration, "1s");
    }

    #[test]
    fn unrelated_properties_are_ignored() {
        let mut longhands = AnimationLonghands::default();
        assert!(!longhands.apply("color", "red"));
        assert_eq!(longhands.compute(), ComputedAnimation::default());
    }
}
