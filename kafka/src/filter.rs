use backend_listener_model::SampleMode;
use regex::Regex;

/// One configured label pattern, matched both as a literal substring and, when it
/// compiles, as a regular expression.
#[derive(Debug)]
struct LabelPattern {
    literal: String,
    regex: Option<Regex>,
}

/// Decides which samples are emitted, from the configured label patterns and the run
/// mode. Patterns are compiled once at setup; matching is case-insensitive because
/// both the patterns and the label are lower-cased.
#[derive(Debug)]
pub struct SampleFilter {
    mode: SampleMode,
    patterns: Vec<LabelPattern>,
}

impl SampleFilter {
    pub fn new(mode: SampleMode, patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .map(|raw| {
                let literal = raw.trim().to_lowercase();
                let regex = match Regex::new(&literal) {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        log::warn!(
                            "Sample filter {literal:?} is not a valid regular expression and \
                             will only match as a substring: {e}"
                        );
                        None
                    }
                };
                LabelPattern { literal, regex }
            })
            .collect();

        Self { mode, patterns }
    }

    /// Whether a sample with this label and success flag should be emitted.
    ///
    /// An empty pattern set admits every label; otherwise the label is admitted when
    /// ANY pattern matches, either as a literal substring or as a regex. The contract
    /// is deliberately order-independent so conflicting patterns cannot flip the
    /// outcome. Independently of label matching, `error` mode drops successful samples.
    pub fn should_emit(&self, label: &str, success: bool) -> bool {
        if self.mode == SampleMode::Error && success {
            return false;
        }

        if self.patterns.is_empty() {
            return true;
        }

        let label = label.trim().to_lowercase();
        self.patterns.iter().any(|pattern| {
            label.contains(&pattern.literal)
                || pattern
                    .regex
                    .as_ref()
                    .is_some_and(|regex| regex.is_match(&label))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_empty_pattern_set_admits_everything() {
        let filter = SampleFilter::new(SampleMode::Info, &[]);

        assert!(filter.should_emit("Any Sample", true));
        assert!(filter.should_emit("Any Sample", false));
    }

    #[test]
    fn test_substring_match_is_case_insensitive() {
        let filter = SampleFilter::new(SampleMode::Info, &patterns(&["login"]));

        assert!(filter.should_emit("User Login Flow", true));
        assert!(!filter.should_emit("Checkout", true));
    }

    #[test]
    fn test_regex_match_admits_label() {
        let filter = SampleFilter::new(SampleMode::Info, &patterns(&["^health.*probe$"]));

        assert!(filter.should_emit("Health Liveness Probe", true));
        assert!(!filter.should_emit("Health Dashboard", true));
    }

    #[test]
    fn test_any_match_wins_across_patterns() {
        let filter = SampleFilter::new(SampleMode::Info, &patterns(&["checkout", "^login"]));

        assert!(filter.should_emit("Checkout Basket", true));
        assert!(filter.should_emit("Login Page", true));
        assert!(!filter.should_emit("Search", true));
    }

    #[test]
    fn test_invalid_regex_still_matches_as_substring() {
        let filter = SampleFilter::new(SampleMode::Info, &patterns(&["("]));

        assert!(filter.should_emit("Weird ( Label", true));
        assert!(!filter.should_emit("Plain Label", true));
    }

    #[test]
    fn test_error_mode_drops_successful_samples() {
        let filter = SampleFilter::new(SampleMode::Error, &patterns(&["login"]));

        assert!(!filter.should_emit("User Login Flow", true));
        assert!(filter.should_emit("User Login Flow", false));
    }

    #[test]
    fn test_error_mode_drops_successful_samples_with_empty_patterns() {
        let filter = SampleFilter::new(SampleMode::Error, &[]);

        assert!(!filter.should_emit("Test Sample", true));
        assert!(filter.should_emit("Test Sample", false));
    }
}
